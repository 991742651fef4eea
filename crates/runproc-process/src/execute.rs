//! Command construction.
//!
//! Callers describe arguments as a single string (for example
//! `"print hello world"`); this module turns it into an argument vector and
//! a fully piped [`tokio::process::Command`].

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Split an argument string into individual arguments.
///
/// Whitespace separates arguments. Double quotes group text containing
/// whitespace and are removed; a backslash escapes a double quote or another
/// backslash inside or outside quotes. An empty pair of quotes yields an empty
/// argument.
///
/// ```
/// use runproc_process::split_arguments;
///
/// assert_eq!(split_arguments(r#"print "hello world""#), vec!["print", "hello world"]);
/// ```
pub fn split_arguments(args: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = args.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('"') | Some('\\')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_token = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    result.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        result.push(current);
    }
    result
}

/// Build a command with stdin, stdout and stderr all piped.
///
/// The child is not killed when the returned `Child` is dropped; the owner
/// decides that explicitly.
pub fn build_command(executable: &Path, working_dir: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);
    cmd
}
