use anyhow::{Context, Result};
use runproc_common::{HostId, ProcessError, ProcessResult, TextEncoding};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunprocConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<ShellConfig>,
}

/// Configuration of one hosted child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Label used in logs and errors; defaults to the executable's file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub executable: PathBuf,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    /// Argument string used when `start` is called without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_args: Option<String>,
    /// Kill a still-running child when the host is dropped
    #[serde(default = "default_true")]
    pub kill_on_drop: bool,
    /// How long `kill` waits for the OS to confirm the child is gone
    #[serde(default = "default_kill_timeout", with = "duration_serde")]
    pub kill_timeout: Duration,
}

/// Configuration of the prompt protocol for an interactive child
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Literal text the child prints when it is ready for input
    pub prompt: String,
    /// Line sent by `terminate` to ask the child to quit
    pub exit_command: String,
    #[serde(default)]
    pub encoding: TextEncoding,
    /// How long `terminate` waits after the exit command before killing
    #[serde(default = "default_terminate_grace", with = "duration_serde")]
    pub terminate_grace: Duration,
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
}

impl HostConfig {
    pub fn new(executable: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            executable: executable.into(),
            working_directory: working_directory.into(),
            default_args: None,
            kill_on_drop: true,
            kill_timeout: default_kill_timeout(),
        }
    }

    pub fn with_default_args(mut self, args: impl Into<String>) -> Self {
        self.default_args = Some(args.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    pub fn host_id(&self) -> HostId {
        match &self.id {
            Some(id) => HostId::new(id.clone()),
            None => HostId::from_executable(&self.executable),
        }
    }

    pub fn validate(&self) -> ProcessResult<()> {
        let id = self.host_id();
        if self.executable.as_os_str().is_empty() {
            return Err(ProcessError::configuration(id.as_str(), "Executable path cannot be empty"));
        }
        if self.kill_timeout.is_zero() {
            return Err(ProcessError::configuration(id.as_str(), "Kill timeout must be greater than 0"));
        }
        Ok(())
    }
}

impl ShellConfig {
    pub fn new(prompt: impl Into<String>, exit_command: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            exit_command: exit_command.into(),
            encoding: TextEncoding::default(),
            terminate_grace: default_terminate_grace(),
            line_terminator: default_line_terminator(),
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn validate(&self) -> ProcessResult<()> {
        if self.prompt.is_empty() {
            return Err(ProcessError::configuration("shell", "Prompt marker cannot be empty"));
        }
        if self.line_terminator.is_empty() {
            return Err(ProcessError::configuration("shell", "Line terminator cannot be empty"));
        }
        for (name, text) in [
            ("prompt", &self.prompt),
            ("exit command", &self.exit_command),
            ("line terminator", &self.line_terminator),
        ] {
            self.encoding.encode(text).map_err(|e| {
                ProcessError::configuration(
                    "shell",
                    format!("The {} cannot be encoded as {}: {}", name, self.encoding, e),
                )
            })?;
        }
        Ok(())
    }
}

impl RunprocConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: RunprocConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(host) = &self.host {
            host.validate().context("Invalid host configuration")?;
        }
        if let Some(shell) = &self.shell {
            shell.validate().context("Invalid shell configuration")?;
        }
        Ok(())
    }
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_kill_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

// Durations are written as "250ms", "5s" or "2m"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            let secs = mins
                .checked_mul(60)
                .ok_or_else(|| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

pub use duration_serde::parse_duration;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflowing_minutes() {
        assert!(parse_duration("999999999999999999m").is_err());
        assert_eq!(
            parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307445734561825860 * 60)
        );
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let yaml = r#"
host:
  executable: ./testexe
shell:
  prompt: ">"
  exit_command: bye
"#;
        let config = RunprocConfig::load_from_string(yaml).unwrap();

        let host = config.host.unwrap();
        assert_eq!(host.working_directory, PathBuf::from("."));
        assert!(host.kill_on_drop);
        assert_eq!(host.kill_timeout, Duration::from_secs(3));
        assert_eq!(host.host_id().as_str(), "testexe");

        let shell = config.shell.unwrap();
        assert_eq!(shell.encoding, TextEncoding::Utf8);
        assert_eq!(shell.terminate_grace, Duration::from_secs(5));
        assert_eq!(shell.line_terminator, "\n");
    }

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
host:
  id: worker
  executable: /opt/tool
  working_directory: /tmp
  default_args: "print hello"
  kill_on_drop: false
  kill_timeout: 500ms
shell:
  prompt: "$ "
  exit_command: exit
  encoding: latin1
  terminate_grace: 2s
  line_terminator: "\r\n"
"#;
        let config = RunprocConfig::load_from_string(yaml).unwrap();
        let host = config.host.unwrap();
        assert_eq!(host.host_id().as_str(), "worker");
        assert_eq!(host.default_args.as_deref(), Some("print hello"));
        assert!(!host.kill_on_drop);
        assert_eq!(host.kill_timeout, Duration::from_millis(500));

        let shell = config.shell.unwrap();
        assert_eq!(shell.encoding, TextEncoding::Latin1);
        assert_eq!(shell.line_terminator, "\r\n");
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let empty_prompt = "shell:\n  prompt: \"\"\n  exit_command: bye\n";
        assert!(RunprocConfig::load_from_string(empty_prompt).is_err());

        let zero_kill = "host:\n  executable: tool\n  kill_timeout: 0s\n";
        assert!(RunprocConfig::load_from_string(zero_kill).is_err());

        let unencodable = "shell:\n  prompt: \"»\"\n  exit_command: bye\n  encoding: ascii\n";
        assert!(RunprocConfig::load_from_string(unencodable).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host:\n  executable: ./testexe\n  default_args: wait").unwrap();

        let config = RunprocConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.host.unwrap().default_args.as_deref(), Some("wait"));
        assert!(config.shell.is_none());
        assert!(RunprocConfig::load_from_file("/definitely/missing.yaml").is_err());
    }

    #[test]
    fn test_duration_round_trip_format() {
        let host = HostConfig::new("tool", ".");
        let yaml = serde_yaml::to_string(&host).unwrap();
        assert!(yaml.contains("kill_timeout: 3s"));
    }
}
