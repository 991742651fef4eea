//! # runproc Process
//!
//! Low-level process operations for runproc.
//!
//! This crate provides cross-platform primitives for:
//! - Argument string splitting and command construction
//! - Executable resolution and validation
//! - Process existence checks
//! - Forced process termination

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
