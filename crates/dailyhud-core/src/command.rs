//! Running external commands with a deadline

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why an external command did not produce usable output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The program is not installed or not on PATH
    #[error("{0} not found in PATH")]
    NotFound(String),
    /// The deadline passed; the child was killed
    #[error("Command timed out")]
    TimedOut,
    /// Non-zero exit, with trimmed stderr
    #[error("{}", failed_message(.stderr))]
    Failed { stderr: String },
    /// Spawning or waiting failed for another reason
    #[error("{0}")]
    Io(String),
}

fn failed_message(stderr: &str) -> &str {
    if stderr.is_empty() {
        "Command failed"
    } else {
        stderr
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run a command and return its stdout
pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<String, CommandError> {
    run_command_with_input(cmd, args, None, timeout)
}

/// Run a command, optionally feeding `input` to stdin, and return stdout.
///
/// The child is killed if it outlives `timeout`.
pub fn run_command_with_input(
    cmd: &str,
    args: &[&str],
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<String, CommandError> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotFound(cmd.to_string()),
            _ => CommandError::Io(format!("Failed to run {}: {}", cmd, e)),
        })?;

    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        // broken pipe here just means the child did not read its input
        let _ = stdin.write_all(data);
    }

    // drain pipes on their own threads so a chatty child cannot block on a full pipe
    let stdout = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::TimedOut);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(CommandError::Io(format!("Failed to wait for {}: {}", cmd, e))),
        }
    };

    let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

    if status.success() {
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    } else {
        Err(CommandError::Failed {
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

/// Check if a command exists on PATH
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}
