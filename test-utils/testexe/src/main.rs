use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Written to stdout when run without a command.
const DEFAULT_STDOUT_MESSAGE: &str = "Hello from testexe";
/// Written to stderr when run without a command.
const DEFAULT_STDERR_MESSAGE: &str = "testexe error stream";

/// Non-interactive test executable for runproc E2E testing
#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Non-interactive child process for runproc testing", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the given words on one line
    Print { words: Vec<String> },
    /// Exit with the given code
    Return {
        #[arg(allow_hyphen_values = true)]
        code: i32,
    },
    /// Sleep until killed
    Wait,
    /// Print numbered lines with a short pause between them
    Stream {
        count: u32,
        #[arg(long, default_value = "10")]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr and stay off unless TESTEXE_LOG is set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TESTEXE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting testexe with args: {:?}", args);

    match args.command {
        None => {
            println!("{}", DEFAULT_STDOUT_MESSAGE);
            eprintln!("{}", DEFAULT_STDERR_MESSAGE);
        }
        Some(Command::Print { words }) => {
            println!("{}", words.join(" "));
        }
        Some(Command::Return { code }) => {
            info!("Exiting with code {}", code);
            std::process::exit(code);
        }
        Some(Command::Wait) => {
            info!("Waiting until killed");
            std::future::pending::<()>().await;
        }
        Some(Command::Stream { count, delay_ms }) => {
            let mut stdout = std::io::stdout();
            for i in 1..=count {
                let _ = writeln!(stdout, "line {}", i);
                let _ = stdout.flush();
                debug!("Wrote line {}", i);
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
