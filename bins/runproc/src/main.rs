use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use runproc_host::config::parse_duration;
use runproc_host::{
    HostConfig, InteractiveShell, ProcessHost, RunprocConfig, ShellConfig, TextEncoding,
};

/// runproc - run and drive child processes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch process and print its output
    Run {
        #[command(flatten)]
        target: Target,

        /// Argument string passed to the executable
        #[arg(short, long)]
        args: Option<String>,
    },
    /// Drive an interactive process from the terminal
    Shell {
        #[command(flatten)]
        target: Target,

        /// Prompt marker printed by the process when it is ready for input
        #[arg(short, long)]
        prompt: Option<String>,

        /// Line sent to ask the process to quit
        #[arg(short, long)]
        exit_command: Option<String>,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// Executable to run (overrides the config file)
    executable: Option<PathBuf>,

    /// Working directory (overrides the config file)
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Timeout such as "500ms", "5s" or "2m"
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(cli.debug)?;

    match cli.command {
        Command::Run { target, args } => {
            let code = run_batch(&target, args.as_deref()).await?;
            std::process::exit(code);
        }
        Command::Shell {
            target,
            prompt,
            exit_command,
        } => run_shell(&target, prompt, exit_command).await,
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    // Child output goes to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

impl Target {
    fn load_config(&self) -> Result<RunprocConfig> {
        match &self.config {
            Some(path) => {
                info!("Config file: {}", path.display());
                RunprocConfig::load_from_file(path)
            }
            None => Ok(RunprocConfig::default()),
        }
    }

    /// Host configuration from the file, with command-line overrides applied.
    fn host_config(&self, file: Option<HostConfig>) -> Result<HostConfig> {
        let mut config = match (file, &self.executable) {
            (Some(mut config), Some(executable)) => {
                config.executable = executable.clone();
                config.id = None;
                config
            }
            (Some(config), None) => config,
            (None, Some(executable)) => HostConfig::new(executable.clone(), "."),
            (None, None) => bail!("No executable given and no host section in the config file"),
        };

        if let Some(cwd) = &self.cwd {
            config.working_directory = cwd.clone();
        }
        config.validate().context("Invalid host configuration")?;
        Ok(config)
    }
}

async fn run_batch(target: &Target, args: Option<&str>) -> Result<i32> {
    let config = target.load_config()?;
    let host_config = target.host_config(config.host)?;

    let mut host = ProcessHost::with_config(host_config);
    host.start(args)
        .await
        .with_context(|| format!("Failed to start {}", host.id()))?;

    if !host.wait_for_exit(target.timeout).await? {
        warn!("Process did not exit within {:?}, killing", target.timeout);
        host.kill().await.context("Failed to kill process")?;
    }

    let stdout = host.stdout().read_all_text(TextEncoding::Utf8Lossy)?;
    let stderr = host.stderr().read_all_text(TextEncoding::Utf8Lossy)?;
    print!("{}", stdout);
    eprint!("{}", stderr);
    std::io::stdout().flush()?;

    let code = host.exit_code()?;
    if host.exit_outcome().is_some_and(|outcome| outcome.was_killed()) {
        warn!("Process {} was killed, reporting code {}", host.id(), code);
    } else {
        info!("Process {} exited with code {}", host.id(), code);
    }
    Ok(code)
}

async fn run_shell(
    target: &Target,
    prompt: Option<String>,
    exit_command: Option<String>,
) -> Result<()> {
    let config = target.load_config()?;
    let host_config = target.host_config(config.host)?;

    let mut shell_config = config
        .shell
        .unwrap_or_else(|| ShellConfig::new(">", "bye"));
    if let Some(prompt) = prompt {
        shell_config.prompt = prompt;
    }
    if let Some(exit_command) = exit_command {
        shell_config.exit_command = exit_command;
    }

    let prompt = shell_config.prompt.clone();
    let mut shell = InteractiveShell::with_config(shell_config)?;
    shell
        .start_with(host_config)
        .await
        .context("Failed to start interactive process")?;

    let intro = shell.read_to_prompt(target.timeout).await?;
    print_reply(&intro.text, intro.found, &prompt)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !shell.is_alive()? {
            break;
        }
        let reply = shell.send_and_receive(&line, target.timeout).await?;
        print_reply(&reply.text, reply.found, &prompt)?;
        if !reply.found && !shell.is_alive()? {
            break;
        }
    }

    shell.terminate().await?;
    info!("Shell exited with code {}", shell.exit_code()?);
    Ok(())
}

fn print_reply(text: &str, found: bool, prompt: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", text)?;
    if found {
        write!(stdout, "{}", prompt)?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "runproc", "run", "./tool", "--args", "print hi", "--timeout", "250ms",
        ])
        .unwrap();
        match cli.command {
            Command::Run { target, args } => {
                assert_eq!(target.executable, Some(PathBuf::from("./tool")));
                assert_eq!(target.timeout, Some(Duration::from_millis(250)));
                assert_eq!(args.as_deref(), Some("print hi"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_shell_command_with_global_debug() {
        let cli = Cli::try_parse_from([
            "runproc", "shell", "./repl", "--prompt", "$ ", "--exit-command", "quit", "--debug",
        ])
        .unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Shell { prompt: Some(ref p), exit_command: Some(ref e), .. } if p == "$ " && e == "quit"
        ));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        assert!(Cli::try_parse_from(["runproc", "run", "./tool", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_host_config_overrides() {
        let target = Target {
            executable: None,
            cwd: Some(PathBuf::from("/tmp")),
            timeout: None,
            config: None,
        };
        assert!(target.host_config(None).is_err());

        let file = HostConfig::new("./from-file", ".").with_id("worker");
        let config = target.host_config(Some(file)).unwrap();
        assert_eq!(config.executable, PathBuf::from("./from-file"));
        assert_eq!(config.working_directory, PathBuf::from("/tmp"));
        assert_eq!(config.host_id().as_str(), "worker");
    }
}
