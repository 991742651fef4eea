//! ProcessHost - lifecycle control for one child process
//!
//! A host spawns its executable with all three standard streams piped,
//! drains stdout and stderr into [`StreamBuffer`]s in the background, and
//! answers liveness, wait, kill and exit-code queries from the OS process
//! table rather than from its own bookkeeping.
//!
//! ```text
//! NotStarted --start--> Running --exit / kill--> Exited --drop--> Disposed
//! ```

use crate::config::HostConfig;
use runproc_common::{ExitOutcome, HostId, ProcessError, ProcessResult};
use runproc_process::{
    build_command, force_kill, process_exists, resolve_executable, split_arguments,
    validate_executable, validate_working_directory,
};
use runproc_process_state::{HostState, HostStateMachine, StateTransition};
use runproc_stream::{spawn_drain, StreamBuffer, StreamType};
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// How long to let the drain tasks flush the last output after an exit.
const DRAIN_SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns one child process and its captured output.
pub struct ProcessHost {
    id: HostId,
    config: HostConfig,
    state: HostStateMachine,
    child: Option<Child>,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    drains: Vec<JoinHandle<u64>>,
    kill_requested: bool,
    exit: Option<ExitOutcome>,
}

impl std::fmt::Debug for ProcessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHost")
            .field("id", &self.id)
            .field("state", &self.state.current_state())
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .finish()
    }
}

impl ProcessHost {
    /// Create a host for `executable`, run from `working_directory`.
    pub fn new(executable: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self::with_config(HostConfig::new(executable, working_directory))
    }

    pub fn with_config(config: HostConfig) -> Self {
        let id = config.host_id();
        Self {
            state: HostStateMachine::new(id.as_str()),
            id,
            config,
            child: None,
            pid: None,
            stdin: None,
            stdout: StreamBuffer::new(StreamType::Stdout),
            stderr: StreamBuffer::new(StreamType::Stderr),
            drains: Vec::new(),
            kill_requested: false,
            exit: None,
        }
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn state(&self) -> HostState {
        self.state.current_state()
    }

    pub fn state_history(&self) -> &[StateTransition] {
        self.state.state_history()
    }

    /// OS process identifier, assigned once by `start`.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &StreamBuffer {
        &self.stdout
    }

    /// Captured standard error.
    pub fn stderr(&self) -> &StreamBuffer {
        &self.stderr
    }

    /// How the child ended, if that has been observed yet.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit
    }

    /// Spawn the child.
    ///
    /// `args` overrides the configured default argument string. Fails with
    /// `InvalidState` if the host was already started and with `SpawnFailed`
    /// if the executable cannot be launched; a failed spawn leaves the host
    /// `NotStarted`.
    pub async fn start(&mut self, args: Option<&str>) -> ProcessResult<()> {
        self.state.ensure_can_start()?;
        self.config.validate()?;

        let working_dir = &self.config.working_directory;
        validate_working_directory(working_dir)?;
        let executable = resolve_executable(&self.config.executable, working_dir);
        validate_executable(&executable)?;

        let arg_string = args.or(self.config.default_args.as_deref()).unwrap_or("");
        let argv = split_arguments(arg_string);

        info!(host = %self.id, executable = %executable.display(), args = ?argv, "Spawning process");

        let mut child = build_command(&executable, working_dir, &argv)
            .spawn()
            .map_err(|e| {
                error!(host = %self.id, error = %e, "Failed to spawn process");
                ProcessError::spawn_failed(
                    self.id.as_str(),
                    format!("{}: {}", executable.display(), e),
                )
            })?;

        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            self.drains
                .push(spawn_drain(stdout, self.stdout.clone(), self.id.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            self.drains
                .push(spawn_drain(stderr, self.stderr.clone(), self.id.clone()));
        }
        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.pid = pid;
        self.state.transition_to_running()?;

        info!(host = %self.id, pid = ?pid, "Process spawned successfully");
        Ok(())
    }

    /// Whether the OS process is still running.
    ///
    /// Reaps the child without blocking, so a process that exited on its own
    /// reports false even if nobody waited for it.
    pub fn is_alive(&mut self) -> ProcessResult<bool> {
        self.state.ensure_started("is_alive")?;
        Ok(self.poll_exit()?.is_none())
    }

    /// Wait for the child to exit on its own.
    ///
    /// Returns `Ok(true)` if it exited within `timeout` (`None` waits
    /// indefinitely). Never kills the child.
    pub async fn wait_for_exit(&mut self, timeout_dur: Option<Duration>) -> ProcessResult<bool> {
        self.state.ensure_started("wait_for_exit")?;
        if self.poll_exit()?.is_some() {
            return Ok(true);
        }

        let child = self.child_mut("wait_for_exit")?;
        let waited = match timeout_dur {
            Some(duration) => timeout(duration, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        match waited {
            None => {
                debug!(host = %self.id, timeout = ?timeout_dur, "Process still running after wait");
                Ok(false)
            }
            Some(Ok(status)) => {
                self.record_status(status);
                self.settle_drains().await;
                Ok(true)
            }
            Some(Err(e)) => Err(ProcessError::io(
                self.id.as_str(),
                format!("Failed to wait for process: {}", e),
            )),
        }
    }

    /// Forcefully terminate the child.
    ///
    /// Does nothing if the child has already exited. Afterwards `exit_code`
    /// reports [`runproc_common::KILLED_EXIT_CODE`].
    pub async fn kill(&mut self) -> ProcessResult<()> {
        self.state.ensure_started("kill")?;
        if let Some(outcome) = self.poll_exit()? {
            debug!(host = %self.id, outcome = %outcome, "Kill requested after exit, nothing to do");
            return Ok(());
        }

        let pid = self.pid.ok_or_else(|| {
            ProcessError::stop_failed(self.id.as_str(), "No PID recorded for running process")
        })?;

        warn!(host = %self.id, pid, "Force killing process");
        force_kill(pid)?;
        self.kill_requested = true;

        let kill_timeout = self.config.kill_timeout;
        let child = self.child_mut("kill")?;
        let reaped = timeout(kill_timeout, child.wait()).await;
        match reaped {
            Ok(Ok(status)) => {
                self.record_status(status);
            }
            Ok(Err(e)) => {
                return Err(ProcessError::io(
                    self.id.as_str(),
                    format!("Failed to reap killed process: {}", e),
                ));
            }
            Err(_) => match process_exists(pid) {
                Ok(false) => self.record_outcome(ExitOutcome::Killed),
                Ok(true) => {
                    return Err(ProcessError::stop_failed(
                        self.id.as_str(),
                        format!("Process did not exit within {:?} of being killed", kill_timeout),
                    ));
                }
                Err(e) => return Err(e),
            },
        }

        self.settle_drains().await;
        info!(host = %self.id, pid, "Process killed");
        Ok(())
    }

    /// The child's exit code.
    ///
    /// Natural exits report the real code, forced kills by this host report
    /// 127. Fails with `InvalidState` while the child is still running.
    pub fn exit_code(&mut self) -> ProcessResult<i32> {
        self.state.ensure_started("exit_code")?;
        match self.poll_exit()? {
            Some(outcome) => Ok(outcome.code()),
            None => Err(ProcessError::invalid_state(
                self.id.as_str(),
                HostState::Exited.to_string(),
                self.state.current_state().to_string(),
            )),
        }
    }

    /// Write raw bytes to the child's standard input.
    pub async fn write_input(&mut self, bytes: &[u8]) -> ProcessResult<()> {
        self.state.ensure_started("write_input")?;
        let id = self.id.clone();
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProcessError::io(id.as_str(), "Standard input is closed"))?;

        stdin
            .write_all(bytes)
            .await
            .map_err(|e| ProcessError::io(id.as_str(), format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| ProcessError::io(id.as_str(), format!("Failed to flush stdin: {}", e)))?;

        debug!(host = %id, bytes = bytes.len(), "Wrote to stdin");
        Ok(())
    }

    /// Write `text` followed by `\n`.
    pub async fn write_line(&mut self, text: &str) -> ProcessResult<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write_input(&line).await
    }

    /// Close the child's standard input, signalling end of input.
    pub fn close_stdin(&mut self) -> ProcessResult<()> {
        self.state.ensure_started("close_stdin")?;
        if self.stdin.take().is_some() {
            debug!(host = %self.id, "Closed stdin");
        }
        Ok(())
    }

    fn child_mut(&mut self, operation: &str) -> ProcessResult<&mut Child> {
        let id = &self.id;
        self.child.as_mut().ok_or_else(|| {
            ProcessError::operation_not_allowed(id.as_str(), operation, "no child process")
        })
    }

    /// Non-blocking reap; records the exit the first time it is seen.
    fn poll_exit(&mut self) -> ProcessResult<Option<ExitOutcome>> {
        if let Some(outcome) = self.exit {
            return Ok(Some(outcome));
        }

        let status = match self.child.as_mut() {
            Some(child) => child.try_wait().map_err(|e| {
                ProcessError::io(self.id.as_str(), format!("Failed to poll process status: {}", e))
            })?,
            None => None,
        };

        Ok(status.map(|status| self.record_status(status)))
    }

    fn record_status(&mut self, status: ExitStatus) -> ExitOutcome {
        let outcome = if self.kill_requested {
            ExitOutcome::Killed
        } else {
            outcome_from_status(status)
        };
        self.record_outcome(outcome);
        outcome
    }

    fn record_outcome(&mut self, outcome: ExitOutcome) {
        if self.exit.is_some() {
            return;
        }
        self.exit = Some(outcome);
        if let Err(e) = self.state.transition_to_exited(outcome.to_string()) {
            warn!(host = %self.id, error = %e, "Unexpected state while recording exit");
        }

        match outcome {
            ExitOutcome::Exited(0) => {
                info!(host = %self.id, pid = ?self.pid, "Process exited successfully")
            }
            _ => info!(host = %self.id, pid = ?self.pid, outcome = %outcome, "Process exited"),
        }
    }

    /// Give the drain tasks a moment to pick up the final output.
    async fn settle_drains(&mut self) {
        for task in self.drains.drain(..) {
            match timeout(DRAIN_SETTLE_TIMEOUT, task).await {
                Ok(Ok(bytes)) => debug!(host = %self.id, bytes, "Drain task finished"),
                Ok(Err(e)) => warn!(host = %self.id, error = %e, "Drain task failed"),
                // Pipe still held open, e.g. by a grandchild; the task keeps running.
                Err(_) => debug!(host = %self.id, "Drain task still running after exit"),
            }
        }
    }
}

impl Drop for ProcessHost {
    fn drop(&mut self) {
        if self.exit.is_none() {
            let still_running = matches!(self.child.as_mut().map(|c| c.try_wait()), Some(Ok(None)));
            if still_running {
                if self.config.kill_on_drop {
                    if let Some(child) = self.child.as_mut() {
                        match child.start_kill() {
                            Ok(()) => info!(host = %self.id, pid = ?self.pid, "Killed process on drop"),
                            Err(e) => warn!(host = %self.id, error = %e, "Failed to kill process on drop"),
                        }
                    }
                } else {
                    debug!(host = %self.id, pid = ?self.pid, "Host dropped, leaving process running");
                }
            }
        }

        if let Err(e) = self.state.transition_to_disposed() {
            debug!(host = %self.id, error = %e, "Host state on drop");
        }
    }
}

fn outcome_from_status(status: ExitStatus) -> ExitOutcome {
    if let Some(code) = status.code() {
        return ExitOutcome::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitOutcome::Signaled(signal);
        }
    }

    ExitOutcome::Exited(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use runproc_common::{TextEncoding, KILLED_EXIT_CODE};

    fn sh() -> ProcessHost {
        ProcessHost::with_config(HostConfig::new("/bin/sh", std::env::temp_dir()).with_id("sh"))
    }

    #[tokio::test]
    async fn test_operations_before_start_are_rejected() {
        let mut host = sh();
        assert_eq!(host.state(), HostState::NotStarted);
        assert!(matches!(
            host.is_alive(),
            Err(ProcessError::OperationNotAllowed { .. })
        ));
        assert!(matches!(
            host.kill().await,
            Err(ProcessError::OperationNotAllowed { .. })
        ));
        assert!(host.exit_code().is_err());
        assert!(host.pid().is_none());
    }

    #[tokio::test]
    async fn test_natural_exit_code_and_output() {
        let mut host = sh();
        host.start(Some(r#"-c "echo out; echo err 1>&2; exit 3""#))
            .await
            .unwrap();

        assert!(host.wait_for_exit(Some(Duration::from_secs(10))).await.unwrap());
        assert!(!host.is_alive().unwrap());
        assert_eq!(host.exit_code().unwrap(), 3);
        assert_eq!(host.exit_outcome(), Some(ExitOutcome::Exited(3)));
        assert_eq!(host.state(), HostState::Exited);

        assert_eq!(host.stdout().read_all_text(TextEncoding::Utf8).unwrap(), "out\n");
        assert_eq!(host.stderr().read_all_text(TextEncoding::Utf8).unwrap(), "err\n");
        assert!(host.stdout().is_complete());
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let mut host = sh();
        host.start(Some(r#"-c "exit 0""#)).await.unwrap();
        assert!(matches!(
            host.start(None).await,
            Err(ProcessError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let mut host = ProcessHost::new("./no-such-binary", std::env::temp_dir());
        assert!(matches!(
            host.start(None).await,
            Err(ProcessError::SpawnFailed { .. })
        ));
        assert_eq!(host.state(), HostState::NotStarted);
    }

    #[tokio::test]
    async fn test_wait_timeout_then_kill() {
        let mut host = sh();
        host.start(Some(r#"-c "sleep 30""#)).await.unwrap();

        assert!(!host.wait_for_exit(Some(Duration::from_millis(200))).await.unwrap());
        assert!(host.is_alive().unwrap());
        assert!(matches!(
            host.exit_code(),
            Err(ProcessError::InvalidState { .. })
        ));

        host.kill().await.unwrap();
        assert!(host.wait_for_exit(Some(Duration::from_secs(1))).await.unwrap());
        assert!(!host.is_alive().unwrap());
        assert_eq!(host.exit_code().unwrap(), KILLED_EXIT_CODE);

        // Idempotent once exited
        host.kill().await.unwrap();
        assert_eq!(host.exit_code().unwrap(), KILLED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_kill_after_natural_exit_keeps_natural_code() {
        let mut host = sh();
        host.start(Some(r#"-c "exit 5""#)).await.unwrap();
        host.wait_for_exit(None).await.unwrap();
        host.kill().await.unwrap();
        assert_eq!(host.exit_code().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_stdin_round_trip() {
        let mut host = sh();
        host.start(Some(r#"-c "read line; echo got:$line""#)).await.unwrap();
        host.write_line("ping").await.unwrap();
        host.close_stdin().unwrap();

        assert!(host.wait_for_exit(Some(Duration::from_secs(10))).await.unwrap());
        assert_eq!(
            host.stdout().read_all_text(TextEncoding::Utf8).unwrap(),
            "got:ping\n"
        );
        assert!(host.write_line("late").await.is_err());
    }

    #[tokio::test]
    async fn test_default_args_used_when_none_given() {
        let config = HostConfig::new("/bin/sh", std::env::temp_dir())
            .with_default_args(r#"-c "exit 7""#);
        let mut host = ProcessHost::with_config(config);
        host.start(None).await.unwrap();
        host.wait_for_exit(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(host.exit_code().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_drop_kills_running_child() {
        let mut host = sh();
        host.start(Some(r#"-c "sleep 30""#)).await.unwrap();
        let pid = host.pid().unwrap();
        drop(host);

        // Killed on drop; the runtime reaps it in the background.
        let mut gone = false;
        for _ in 0..50 {
            if !process_exists(pid).unwrap() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone || zombie(pid));
    }

    /// A killed but not yet reaped child still has a PID entry.
    fn zombie(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map(|stat| stat.contains(") Z "))
            .unwrap_or(false)
    }
}
