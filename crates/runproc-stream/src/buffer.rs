//! Append-only output buffer.
//!
//! A [`StreamBuffer`] is written by exactly one background drain task and
//! read by any number of consumers. Cloning the buffer clones the handle, not
//! the bytes.

use crate::types::StreamType;
use parking_lot::Mutex;
use runproc_common::{Decoded, ProcessError, ProcessResult, TextEncoding};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Shareable, append-only byte buffer for one output stream.
#[derive(Clone)]
pub struct StreamBuffer {
    shared: Arc<Shared>,
}

struct Shared {
    stream: StreamType,
    state: Mutex<BufferState>,
    /// Bumped on every append and on completion.
    progress: watch::Sender<u64>,
}

#[derive(Default)]
struct BufferState {
    bytes: Vec<u8>,
    /// Cursor for `read_incremental`; always <= bytes.len().
    cursor: usize,
    complete: bool,
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("StreamBuffer")
            .field("stream", &self.shared.stream)
            .field("len", &state.bytes.len())
            .field("cursor", &state.cursor)
            .field("complete", &state.complete)
            .finish()
    }
}

impl StreamBuffer {
    pub fn new(stream: StreamType) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                stream,
                state: Mutex::new(BufferState::default()),
                progress,
            }),
        }
    }

    pub fn stream_type(&self) -> StreamType {
        self.shared.stream
    }

    /// Append bytes produced by the child.
    ///
    /// Ignored once the buffer is complete.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state.lock();
            if state.complete {
                debug!(stream = %self.shared.stream, len = bytes.len(), "Dropping append after end of stream");
                return;
            }
            state.bytes.extend_from_slice(bytes);
        }
        self.shared.progress.send_modify(|generation| *generation += 1);
    }

    /// Record that the underlying handle closed. Idempotent.
    pub fn mark_complete(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.complete {
                return;
            }
            state.complete = true;
        }
        self.shared.progress.send_modify(|generation| *generation += 1);
    }

    /// True once the underlying handle has closed and no more bytes will arrive.
    pub fn is_complete(&self) -> bool {
        self.shared.state.lock().complete
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the shared incremental cursor.
    pub fn cursor(&self) -> usize {
        self.shared.state.lock().cursor
    }

    /// Raw copy of everything captured so far.
    pub fn read_all_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().bytes.clone()
    }

    /// Decode everything captured so far without moving any cursor.
    ///
    /// While the stream is still open, a character whose bytes have only
    /// partly arrived is left out until the rest arrives.
    pub fn read_all_text(&self, encoding: TextEncoding) -> ProcessResult<String> {
        let state = self.shared.state.lock();
        self.decode(&state.bytes, 0, encoding, state.complete)
            .map(|decoded| decoded.text)
    }

    /// Decode the bytes appended since the previous incremental read and
    /// advance the shared cursor past them.
    ///
    /// On a decode error the cursor does not move.
    pub fn read_incremental(&self, encoding: TextEncoding) -> ProcessResult<String> {
        let mut state = self.shared.state.lock();
        let start = state.cursor;
        let decoded = self.decode(&state.bytes[start..], start, encoding, state.complete)?;
        state.cursor = start + decoded.consumed;
        Ok(decoded.text)
    }

    /// Run `f` over the captured bytes and the completion flag while holding
    /// the buffer lock. Keep `f` short: the drain task waits on the same lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&[u8], bool) -> R) -> R {
        let state = self.shared.state.lock();
        f(&state.bytes, state.complete)
    }

    /// Decode `bytes[start..end]` of this buffer.
    ///
    /// `is_final` controls whether an unfinished trailing character is an
    /// error (true) or left out of the result (false).
    pub fn decode_range(
        &self,
        start: usize,
        end: usize,
        encoding: TextEncoding,
        is_final: bool,
    ) -> ProcessResult<Decoded> {
        let state = self.shared.state.lock();
        let end = end.min(state.bytes.len());
        let start = start.min(end);
        self.decode(&state.bytes[start..end], start, encoding, is_final)
    }

    /// Subscribe to append/completion notifications.
    ///
    /// The receiver starts with the current generation marked as seen, so a
    /// caller that checks the buffer after subscribing and then awaits
    /// `changed()` cannot miss an append.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.progress.subscribe()
    }

    /// Wait until the stream completes. Returns false if the timeout elapsed
    /// first; `None` waits indefinitely.
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        let mut changes = self.changes();
        let wait = async {
            while !self.is_complete() {
                if changes.changed().await.is_err() {
                    break;
                }
            }
        };

        match timeout {
            Some(duration) => {
                let _ = tokio::time::timeout(duration, wait).await;
            }
            None => wait.await,
        }
        self.is_complete()
    }

    fn decode(
        &self,
        bytes: &[u8],
        base_offset: usize,
        encoding: TextEncoding,
        is_final: bool,
    ) -> ProcessResult<Decoded> {
        encoding.decode_prefix(bytes, is_final).map_err(|e| {
            ProcessError::decode(
                self.shared.stream.to_string(),
                encoding.as_str(),
                base_offset + e.offset,
                e.reason,
            )
        })
    }
}
