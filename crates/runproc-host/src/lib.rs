//! # runproc Host
//!
//! Hosting of child processes and prompt-driven interactive shells.
//!
//! - [`ProcessHost`]: start, observe, wait for and kill one child process,
//!   with its stdout and stderr captured into [`StreamBuffer`]s
//! - [`InteractiveShell`]: a [`ProcessHost`] driven through a textual prompt
//!   protocol, one request/response round trip at a time
//! - [`config`]: YAML configuration for both
//!
//! ```no_run
//! use runproc_host::InteractiveShell;
//! use std::time::Duration;
//!
//! # async fn demo() -> runproc_host::ProcessResult<()> {
//! let mut shell = InteractiveShell::new(">", "bye")?;
//! shell.start("./repl", ".").await?;
//! let intro = shell.read_to_prompt(Some(Duration::from_secs(5))).await?;
//! let reply = shell.send_and_receive("hello", Some(Duration::from_secs(5))).await?;
//! println!("{}{}", intro.text, reply.text);
//! shell.terminate().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod host;
pub mod prompt;
pub mod shell;

pub use config::{HostConfig, RunprocConfig, ShellConfig};
pub use host::ProcessHost;
pub use prompt::{PromptReply, PromptSession};
pub use shell::InteractiveShell;

pub use runproc_common::{ExitOutcome, HostId, ProcessError, ProcessResult, TextEncoding, KILLED_EXIT_CODE};
pub use runproc_process_state::HostState;
pub use runproc_stream::{StreamBuffer, StreamType};
