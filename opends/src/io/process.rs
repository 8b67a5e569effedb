//! Helpers for running child processes with optional timeouts and bounded output.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout followed by stderr, with truncation and timeout notices.
    pub fn combined_log(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stderr_truncated > 0 {
            buf.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        if self.timed_out {
            buf.push_str("\n[timed out]\n");
        }
        buf
    }
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes`
/// bounds what each stream keeps in memory; the rest is drained and counted.
/// With `timeout` unset the call blocks until the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(program, err = %e, "failed to spawn command");
            return Err(Error::io("spawn", program, e));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Validation("stdout was not piped".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Validation("stderr was not piped".to_string()))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().map_err(|e| Error::io("wait for", &program, e))?,
        Some(limit) => match child
            .wait_timeout(limit)
            .map_err(|e| Error::io("wait for", &program, e))?
        {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child.kill().map_err(|e| Error::io("kill", &program, e))?;
                child
                    .wait()
                    .map_err(|e| Error::io("wait after kill", &program, e))?
            }
        },
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle, &program)?;
    let (stderr, stderr_truncated) = join_output(stderr_handle, &program)?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
    program: &str,
) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result.map_err(|e| Error::io("read output of", program, e)),
        Err(_) => Err(Error::Validation("output reader thread panicked".to_string())),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams() {
        let output = run_command(sh("echo out; echo err >&2"), None, 1000).expect("run");
        assert!(output.success());
        let log = output.combined_log();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
    }

    #[test]
    fn truncates_beyond_limit() {
        let output = run_command(sh("printf 'abcdefghij'"), None, 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.combined_log().contains("truncated 6 bytes"));
    }

    #[test]
    fn reports_failure_and_timeout() {
        let failed = run_command(sh("exit 3"), None, 100).expect("run");
        assert!(!failed.success());
        assert_eq!(failed.status.code(), Some(3));

        let slow = run_command(sh("sleep 5"), Some(Duration::from_millis(100)), 100).expect("run");
        assert!(slow.timed_out);
        assert!(!slow.success());
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let err = run_command(Command::new("opends-no-such-program"), None, 100).unwrap_err();
        assert!(matches!(err, Error::Io { action: "spawn", .. }));
    }
}
