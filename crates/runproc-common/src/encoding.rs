//! Text encodings for captured process output.
//!
//! Output buffers store raw bytes untouched; callers choose an encoding at
//! read time. Decoding never mutates the input, so a failed decode can be
//! retried with a different encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Encoding used to turn raw output bytes into text (and prompt text into
/// bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Strict UTF-8; invalid sequences are an error.
    #[default]
    Utf8,
    /// UTF-8 with U+FFFD substituted for invalid sequences.
    Utf8Lossy,
    /// Strict 7-bit ASCII.
    Ascii,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

/// Failure to represent bytes (or text) under an encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} (at byte {offset})")]
pub struct EncodingError {
    /// Offset of the first offending byte (or char) in the input.
    pub offset: usize,
    pub reason: String,
}

/// Result of decoding a prefix of a byte slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// Number of input bytes the text covers. Bytes past this point belong
    /// to a character that has not fully arrived yet.
    pub consumed: usize,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Utf8Lossy => "utf8_lossy",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin1",
        }
    }

    /// Decodes the whole slice.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, EncodingError> {
        self.decode_prefix(bytes, true).map(|decoded| decoded.text)
    }

    /// Decodes as much of `bytes` as forms complete characters.
    ///
    /// When `is_final` is false an incomplete multi-byte sequence at the end
    /// is left out of the result instead of being reported as invalid.
    pub fn decode_prefix(&self, bytes: &[u8], is_final: bool) -> Result<Decoded, EncodingError> {
        match self {
            TextEncoding::Utf8 => decode_utf8_strict(bytes, is_final),
            TextEncoding::Utf8Lossy => {
                let end = if is_final {
                    bytes.len()
                } else {
                    bytes.len() - incomplete_utf8_tail(bytes)
                };
                Ok(Decoded {
                    text: String::from_utf8_lossy(&bytes[..end]).into_owned(),
                    consumed: end,
                })
            }
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(EncodingError {
                    offset,
                    reason: format!("byte 0x{:02x} is not ASCII", bytes[offset]),
                }),
                None => Ok(Decoded {
                    text: bytes.iter().map(|&b| b as char).collect(),
                    consumed: bytes.len(),
                }),
            },
            TextEncoding::Latin1 => Ok(Decoded {
                text: bytes.iter().map(|&b| b as char).collect(),
                consumed: bytes.len(),
            }),
        }
    }

    /// Encodes text for writing to a child or for matching against output.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            TextEncoding::Utf8 | TextEncoding::Utf8Lossy => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => encode_narrow(text, 0x7f, "ASCII"),
            TextEncoding::Latin1 => encode_narrow(text, 0xff, "Latin-1"),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn decode_utf8_strict(bytes: &[u8], is_final: bool) -> Result<Decoded, EncodingError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Decoded {
            text: text.to_owned(),
            consumed: bytes.len(),
        }),
        Err(e) => {
            let valid = e.valid_up_to();
            // error_len() == None means the input ended mid-character.
            if e.error_len().is_none() && !is_final {
                return Ok(Decoded {
                    text: String::from_utf8_lossy(&bytes[..valid]).into_owned(),
                    consumed: valid,
                });
            }
            Err(EncodingError {
                offset: valid,
                reason: e.to_string(),
            })
        }
    }
}

/// Length of a trailing, possibly-valid but unfinished UTF-8 sequence.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let expected = match b {
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return 0,
        };
        let available = bytes.len() - i;
        return if available < expected { available } else { 0 };
    }
    0
}

fn encode_narrow(text: &str, max: u32, name: &str) -> Result<Vec<u8>, EncodingError> {
    text.chars()
        .enumerate()
        .map(|(offset, c)| {
            let value = c as u32;
            if value <= max {
                Ok(value as u8)
            } else {
                Err(EncodingError {
                    offset,
                    reason: format!("character {:?} cannot be encoded as {}", c, name),
                })
            }
        })
        .collect()
}
