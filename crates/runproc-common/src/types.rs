//! Core domain types used throughout runproc.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Exit code reported for any process this library force-killed, regardless
/// of what the platform's native kill status would be.
pub const KILLED_EXIT_CODE: i32 = 127;

/// Host identifier - a human-readable label for one managed child.
///
/// Used in log fields and error messages. By default it is the file name of
/// the executable.
///
/// # Example
/// ```
/// use runproc_common::HostId;
///
/// let id = HostId::from_executable("/usr/bin/python3");
/// assert_eq!(id.as_str(), "python3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an identifier from an executable path.
    pub fn from_executable(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    /// The process exited on its own with this code.
    Exited(i32),
    /// The process was terminated by a signal this library did not send.
    Signaled(i32),
    /// The process was force-killed by its host.
    Killed,
}

impl ExitOutcome {
    /// The exit code callers see.
    ///
    /// Signals map to the shell convention `128 + signal`; forced kills
    /// always map to [`KILLED_EXIT_CODE`].
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Signaled(signal) => 128 + signal,
            ExitOutcome::Killed => KILLED_EXIT_CODE,
        }
    }

    pub fn was_killed(&self) -> bool {
        matches!(self, ExitOutcome::Killed)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with code {}", code),
            ExitOutcome::Signaled(signal) => write!(f, "terminated by signal {}", signal),
            ExitOutcome::Killed => write!(f, "killed"),
        }
    }
}
