//! # runproc Stream
//!
//! Output capture for child processes.
//!
//! This crate provides:
//! - [`StreamBuffer`]: an append-only, shareable byte sink with a read cursor
//! - [`spawn_drain`]: a background task that copies a pipe into a buffer
//!   until the pipe closes
//! - [`StreamType`]: which standard stream a buffer captures

pub mod buffer;
pub mod drain;
pub mod types;

pub use buffer::StreamBuffer;
pub use drain::{spawn_drain, DRAIN_CHUNK_SIZE};
pub use types::StreamType;
