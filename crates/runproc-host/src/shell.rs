//! InteractiveShell - request/response driving of a prompt-based child.

use crate::config::{HostConfig, ShellConfig};
use crate::host::ProcessHost;
use crate::prompt::{PromptReply, PromptSession};
use runproc_common::{ProcessError, ProcessResult};
use runproc_stream::StreamBuffer;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// A long-lived child that prints a prompt whenever it is ready for input.
#[derive(Debug)]
pub struct InteractiveShell {
    config: ShellConfig,
    session: PromptSession,
    host: Option<ProcessHost>,
}

impl InteractiveShell {
    /// Shell with the given prompt marker and exit command and default
    /// settings otherwise.
    pub fn new(prompt: impl Into<String>, exit_command: impl Into<String>) -> ProcessResult<Self> {
        Self::with_config(ShellConfig::new(prompt, exit_command))
    }

    pub fn with_config(config: ShellConfig) -> ProcessResult<Self> {
        config.validate()?;
        let session = PromptSession::new(&config.prompt, &config.exit_command, config.encoding)?;
        Ok(Self {
            config,
            session,
            host: None,
        })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn session(&self) -> &PromptSession {
        &self.session
    }

    /// The underlying host, once started.
    pub fn host(&self) -> Option<&ProcessHost> {
        self.host.as_ref()
    }

    /// Start `executable` in `working_directory` with no arguments.
    pub async fn start(
        &mut self,
        executable: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
    ) -> ProcessResult<()> {
        self.start_with(HostConfig::new(executable, working_directory))
            .await
    }

    /// Start the child described by `host_config`.
    pub async fn start_with(&mut self, host_config: HostConfig) -> ProcessResult<()> {
        if let Some(host) = &self.host {
            return Err(ProcessError::invalid_state(
                host.id().as_str(),
                "not_started",
                host.state().to_string(),
            ));
        }

        let mut host = ProcessHost::with_config(host_config);
        host.start(None).await?;
        info!(host = %host.id(), prompt = %self.config.prompt, "Interactive shell started");
        self.host = Some(host);
        Ok(())
    }

    /// Wait for the next prompt on stdout.
    pub async fn read_to_prompt(&mut self, timeout: Option<Duration>) -> ProcessResult<PromptReply> {
        let stdout = self.host_ref("read_to_prompt")?.stdout().clone();
        self.session.read_to_prompt(&stdout, timeout).await
    }

    /// Send `text` as one line, then wait for the next prompt.
    pub async fn send_and_receive(
        &mut self,
        text: &str,
        timeout: Option<Duration>,
    ) -> ProcessResult<PromptReply> {
        self.send_line(text).await?;
        self.read_to_prompt(timeout).await
    }

    /// Ask the child to quit with the exit command; kill it if it has not
    /// exited within the grace period.
    pub async fn terminate(&mut self) -> ProcessResult<()> {
        let exit_command = self.config.exit_command.clone();
        let grace = self.config.terminate_grace;

        if !self.host_mut("terminate")?.is_alive()? {
            return Ok(());
        }

        // The child may already be gone and have closed its stdin.
        if let Err(e) = self.send_line(&exit_command).await {
            debug!(error = %e, "Failed to send exit command");
        }

        let host = self.host_mut("terminate")?;
        if host.wait_for_exit(Some(grace)).await? {
            info!(host = %host.id(), "Interactive shell exited");
            return Ok(());
        }

        warn!(host = %host.id(), grace = ?grace, "Shell ignored exit command, killing");
        host.kill().await
    }

    pub fn is_alive(&mut self) -> ProcessResult<bool> {
        self.host_mut("is_alive")?.is_alive()
    }

    pub fn exit_code(&mut self) -> ProcessResult<i32> {
        self.host_mut("exit_code")?.exit_code()
    }

    /// Captured standard error of the child.
    pub fn stderr(&self) -> ProcessResult<&StreamBuffer> {
        Ok(self.host_ref("stderr")?.stderr())
    }

    async fn send_line(&mut self, text: &str) -> ProcessResult<()> {
        let mut line = self.encode(text)?;
        line.extend(self.encode(&self.config.line_terminator)?);
        debug!(text = %text, "Sending line to shell");
        self.host_mut("send_and_receive")?.write_input(&line).await
    }

    fn encode(&self, text: &str) -> ProcessResult<Vec<u8>> {
        self.config.encoding.encode(text).map_err(|e| {
            ProcessError::io(
                self.host_id(),
                format!("Input cannot be encoded as {}: {}", self.config.encoding, e),
            )
        })
    }

    fn host_id(&self) -> String {
        match &self.host {
            Some(host) => host.id().to_string(),
            None => "shell".to_string(),
        }
    }

    fn host_ref(&self, operation: &str) -> ProcessResult<&ProcessHost> {
        self.host
            .as_ref()
            .ok_or_else(|| ProcessError::operation_not_allowed("shell", operation, "not_started"))
    }

    fn host_mut(&mut self, operation: &str) -> ProcessResult<&mut ProcessHost> {
        self.host
            .as_mut()
            .ok_or_else(|| ProcessError::operation_not_allowed("shell", operation, "not_started"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const ECHO_SCRIPT: &str = r#"-c "echo hi; printf '> '; while read l; do test $l = bye && exit 0; echo you said $l; printf '> '; done""#;

    fn sh_config() -> HostConfig {
        HostConfig::new("/bin/sh", std::env::temp_dir()).with_default_args(ECHO_SCRIPT)
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let mut shell = InteractiveShell::new("> ", "bye").unwrap();
        assert!(shell.host().is_none());
        assert!(matches!(
            shell.read_to_prompt(None).await,
            Err(ProcessError::OperationNotAllowed { .. })
        ));
        assert!(matches!(
            shell.is_alive(),
            Err(ProcessError::OperationNotAllowed { .. })
        ));
        assert!(shell.terminate().await.is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(InteractiveShell::new("", "bye").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_and_terminate() {
        let mut shell = InteractiveShell::new("> ", "bye").unwrap();
        shell.start_with(sh_config()).await.unwrap();

        let intro = shell.read_to_prompt(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(intro, PromptReply::found("hi\n"));

        let reply = shell
            .send_and_receive("ping", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(reply.found);
        assert_eq!(reply.text, "you said ping\n");

        shell.terminate().await.unwrap();
        assert!(!shell.is_alive().unwrap());
        assert_eq!(shell.exit_code().unwrap(), 0);

        // Already exited: nothing left to do
        shell.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let mut shell = InteractiveShell::new("> ", "bye").unwrap();
        shell.start_with(sh_config()).await.unwrap();
        assert!(matches!(
            shell.start_with(sh_config()).await,
            Err(ProcessError::InvalidState { .. })
        ));
        shell.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let config = ShellConfig::new("> ", "bye").with_terminate_grace(Duration::from_millis(200));
        let mut shell = InteractiveShell::with_config(config).unwrap();
        shell
            .start_with(
                HostConfig::new("/bin/sh", std::env::temp_dir())
                    .with_default_args(r#"-c "printf '> '; exec sleep 30""#),
            )
            .await
            .unwrap();

        assert!(shell.read_to_prompt(Some(Duration::from_secs(10))).await.unwrap().found);
        shell.terminate().await.unwrap();
        assert!(!shell.is_alive().unwrap());
        assert_eq!(shell.exit_code().unwrap(), runproc_common::KILLED_EXIT_CODE);
    }
}
