//! Interactive test executable: an echo loop behind a `>` prompt.

use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const INTRO: &str = "Interactive testexe ready. Type 'bye' to quit.";

#[derive(Parser, Debug)]
#[command(name = "testexe-interactive")]
#[command(about = "Interactive child process for runproc testing", long_about = None)]
struct Args {
    /// Prompt printed before each line of input
    #[arg(long, default_value = ">")]
    prompt: String,

    /// Line that ends the session
    #[arg(long, default_value = "bye")]
    exit_command: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TESTEXE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{}", INTRO);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let _ = write!(stdout, "{}", args.prompt);
        let _ = stdout.flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                info!("Input closed");
                break;
            }
        };

        let line = line.trim_end_matches('\r');
        if line == args.exit_command {
            let _ = writeln!(stdout, "Goodbye");
            let _ = stdout.flush();
            info!("Exit command received");
            break;
        }

        let _ = writeln!(stdout, "You wrote {}", line);
    }
}
