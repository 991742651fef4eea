//! # runproc Common
//!
//! Common types and error definitions shared across the runproc crates.
//!
//! This crate provides the foundational pieces every other crate builds on:
//! the process error taxonomy, the host identifier, the exit outcome
//! convention and the text encodings used to decode captured output.

pub mod encoding;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use encoding::{Decoded, EncodingError, TextEncoding};
pub use errors::{ProcessError, ProcessResult};
pub use types::{ExitOutcome, HostId, KILLED_EXIT_CODE};
