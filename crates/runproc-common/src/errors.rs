//! Error types for runproc.
//!
//! Every fallible operation in the library crates returns
//! [`ProcessResult<T>`]. Timeouts are deliberately absent from the taxonomy:
//! bounded waits report them as a `bool`/`found` flag instead.

use thiserror::Error;

/// Process-specific error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The executable could not be launched (not found, not executable,
    /// permission denied).
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    /// An operation was invoked in a lifecycle state that forbids it.
    #[error("Process state error: {id} - expected {expected}, got {actual}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    /// An operation was invoked before the process was started.
    #[error("Process operation not allowed: {id} - {operation} (state: {state})")]
    OperationNotAllowed {
        id: String,
        operation: String,
        state: String,
    },

    /// Captured bytes cannot be rendered under the requested encoding.
    #[error("Decode failed: {stream} as {encoding} at byte {offset} - {reason}")]
    Decode {
        stream: String,
        encoding: String,
        offset: usize,
        reason: String,
    },

    /// Writing to or closing the child's standard input failed, or the OS
    /// reported an unexpected error while waiting.
    #[error("Process I/O error: {id} - {reason}")]
    Io { id: String, reason: String },

    /// The OS refused to terminate the process.
    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },
}

impl ProcessError {
    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn operation_not_allowed(
        id: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::OperationNotAllowed {
            id: id.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn decode(
        stream: impl Into<String>,
        encoding: impl Into<String>,
        offset: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::Decode {
            stream: stream.into(),
            encoding: encoding.into(),
            offset,
            reason: reason.into(),
        }
    }

    pub fn io(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
