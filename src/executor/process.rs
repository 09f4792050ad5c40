//! Shell command execution with a hard timeout.

use crate::error::{ConfigoError, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How long to wait for pipe readers once the child has exited. Background
/// grandchildren can keep a pipe open long after the shell is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of one command run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal or timed out
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Most informative text for an error message: stderr, else stdout
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run `command` through `bash -c` with stdin closed.
///
/// Returns `Err` only when the shell itself cannot be launched; a non-zero
/// exit or a timeout is reported in the returned [`CommandOutput`].
pub fn run_shell(command: &str, timeout: Duration) -> Result<CommandOutput> {
    run_shell_with_input(command, None, timeout)
}

/// Like [`run_shell`], feeding `input` to the command's stdin
pub fn run_shell_with_input(
    command: &str,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(command);
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("Running: {}", command);
    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        ConfigoError::CommandFailed(format!("Failed to launch bash: {}", e))
    })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        let data = data.to_vec();
        thread::spawn(move || {
            // The child may exit without reading; a broken pipe is not our failure
            if let Err(e) = stdin.write_all(&data) {
                debug!("Could not write stdin: {}", e);
            }
        });
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            warn!("Command timed out after {}s, killing", timeout.as_secs());
            timed_out = true;
            child.kill()?;
            child.wait()?
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    let elapsed = started.elapsed();

    debug!(
        "Finished in {:.2}s with code {:?}{}",
        elapsed.as_secs_f64(),
        status.code(),
        if timed_out { " (timed out)" } else { "" }
    );

    Ok(CommandOutput {
        code: if timed_out { None } else { status.code() },
        stdout,
        stderr,
        timed_out,
        elapsed,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(rx: Option<mpsc::Receiver<String>>) -> String {
    rx.and_then(|rx| rx.recv_timeout(DRAIN_GRACE).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_stderr() {
        let output = run_shell("echo out; echo err >&2", Duration::from_secs(5)).unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn test_nonzero_exit() {
        let output = run_shell("exit 3", Duration::from_secs(5)).unwrap();

        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.error_text(), "exited with code 3");
    }

    #[test]
    fn test_timeout_kills_command() {
        let output = run_shell("sleep 5", Duration::from_millis(200)).unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.elapsed < Duration::from_secs(4));
    }

    #[test]
    fn test_input_is_piped() {
        let output = run_shell_with_input("cat", Some(b"hello"), Duration::from_secs(5)).unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let output = run_shell("echo visible; echo broken >&2; false", Duration::from_secs(5))
            .unwrap();
        assert_eq!(output.error_text(), "broken");
    }
}
