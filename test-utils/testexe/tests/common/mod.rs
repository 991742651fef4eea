//! Shared setup for the runproc end-to-end tests.

#![allow(dead_code)]

use runproc_host::{HostConfig, InteractiveShell, ProcessHost};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Generous bound for anything that should happen "promptly".
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn testexe_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_testexe"))
}

pub fn interactive_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_testexe-interactive"))
}

/// A scratch working directory that lives as long as the test.
pub struct TestEnv {
    name: String,
    dir: TempDir,
}

impl TestEnv {
    pub fn new(name: &str) -> Self {
        println!("\n=== TEST: {} ===", name);
        let dir = tempfile::Builder::new()
            .prefix(&format!("runproc-{}-", name))
            .tempdir()
            .unwrap_or_else(|e| panic!("Failed to create scratch dir for {}: {}", name, e));
        Self {
            name: name.to_string(),
            dir,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Host for the non-interactive test executable.
    pub fn testexe_host(&self) -> ProcessHost {
        ProcessHost::with_config(HostConfig::new(testexe_path(), self.work_dir()).with_id(&self.name))
    }

    /// Shell for the interactive test executable, already started.
    pub async fn interactive_shell(&self) -> InteractiveShell {
        let mut shell = InteractiveShell::new(">", "bye").unwrap();
        shell
            .start_with(HostConfig::new(interactive_path(), self.work_dir()).with_id(&self.name))
            .await
            .unwrap();
        shell
    }
}
