//! Prompt matching over a growing output buffer.
//!
//! A [`PromptSession`] keeps its own cursor into one [`StreamBuffer`] and
//! splits the output into replies delimited by a literal prompt marker.
//! Matching runs over the accumulated bytes, so a marker that arrives split
//! across two reads is still found.

use runproc_common::{ProcessError, ProcessResult, TextEncoding};
use runproc_stream::StreamBuffer;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, trace};

/// Text collected by one prompt read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptReply {
    /// Output between the previous prompt and this one, marker excluded.
    pub text: String,
    /// False if the read gave up on a timeout or end of stream.
    pub found: bool,
}

impl PromptReply {
    pub fn found(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            found: true,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            found: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptSession {
    prompt: String,
    marker: Vec<u8>,
    exit_command: String,
    encoding: TextEncoding,
    /// Bytes before this offset have been returned to the caller.
    offset: usize,
    /// Bytes before this offset have been searched for the marker.
    scanned_to: usize,
}

impl PromptSession {
    pub fn new(
        prompt: impl Into<String>,
        exit_command: impl Into<String>,
        encoding: TextEncoding,
    ) -> ProcessResult<Self> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(ProcessError::configuration("shell", "Prompt marker cannot be empty"));
        }
        let marker = encoding.encode(&prompt).map_err(|e| {
            ProcessError::configuration(
                "shell",
                format!("Prompt cannot be encoded as {}: {}", encoding, e),
            )
        })?;

        Ok(Self {
            prompt,
            marker,
            exit_command: exit_command.into(),
            encoding,
            offset: 0,
            scanned_to: 0,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn exit_command(&self) -> &str {
        &self.exit_command
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Byte offset of the first output not yet returned.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Wait for the next prompt marker in `buffer`.
    ///
    /// Returns the text up to the marker and moves past it. If `timeout`
    /// elapses or the stream ends first, returns what has arrived with
    /// `found = false`; that text is consumed, except for a trailing piece
    /// that may still turn out to be the start of the marker.
    pub async fn read_to_prompt(
        &mut self,
        buffer: &StreamBuffer,
        timeout: Option<Duration>,
    ) -> ProcessResult<PromptReply> {
        let deadline = timeout.map(|d| Instant::now() + d);
        // Subscribe before the first scan so no append is missed.
        let mut changes = buffer.changes();

        loop {
            let (position, len, complete) = buffer.inspect(|bytes, complete| {
                (self.find_marker(bytes), bytes.len(), complete)
            });

            if let Some(position) = position {
                let decoded = buffer.decode_range(self.offset, position, self.encoding, true);
                trace!(offset = self.offset, position, "Prompt marker found");
                // Move past the marker even if the reply cannot be decoded,
                // so the next read starts at the next reply.
                self.offset = position + self.marker.len();
                self.scanned_to = self.offset;
                return decoded.map(|decoded| PromptReply::found(decoded.text));
            }
            self.scanned_to = len;

            if complete {
                debug!(prompt = %self.prompt, "Stream ended before prompt");
                return self.take_partial(buffer, true);
            }

            let changed = match deadline {
                Some(deadline) => match timeout_at(deadline, changes.changed()).await {
                    Ok(result) => result.is_ok(),
                    Err(_) => {
                        debug!(prompt = %self.prompt, timeout = ?timeout, "Timed out waiting for prompt");
                        return self.take_partial(buffer, false);
                    }
                },
                None => changes.changed().await.is_ok(),
            };

            if !changed {
                return self.take_partial(buffer, buffer.is_complete());
            }
        }
    }

    fn find_marker(&self, bytes: &[u8]) -> Option<usize> {
        let overlap = self.marker.len().saturating_sub(1);
        let from = self.offset.max(self.scanned_to.saturating_sub(overlap));
        if from >= bytes.len() {
            return None;
        }
        bytes[from..]
            .windows(self.marker.len())
            .position(|window| window == self.marker.as_slice())
            .map(|index| from + index)
    }

    fn take_partial(&mut self, buffer: &StreamBuffer, complete: bool) -> ProcessResult<PromptReply> {
        let end = buffer.inspect(|bytes, _| {
            if complete {
                bytes.len()
            } else {
                bytes.len() - marker_prefix_overlap(&bytes[self.offset..], &self.marker)
            }
        });

        match buffer.decode_range(self.offset, end, self.encoding, complete) {
            Ok(decoded) => {
                self.offset += decoded.consumed;
                Ok(PromptReply::partial(decoded.text))
            }
            Err(e) => {
                // Undecodable output is skipped; the raw bytes stay in the buffer.
                self.offset = self.offset.max(end);
                Err(e)
            }
        }
    }
}

/// Length of the longest suffix of `bytes` that is a proper prefix of `marker`.
fn marker_prefix_overlap(bytes: &[u8], marker: &[u8]) -> usize {
    let max = bytes.len().min(marker.len().saturating_sub(1));
    (1..=max)
        .rev()
        .find(|&n| bytes[bytes.len() - n..] == marker[..n])
        .unwrap_or(0)
}
