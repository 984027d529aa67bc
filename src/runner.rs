//! Bounded execution of external programs.
//!
//! Every tool the pipeline touches (oracle command, search/download, transcoder)
//! runs through [`run_tool`], which enforces a wall-clock timeout and drains the
//! child's pipes on helper threads so verbose tools cannot stall on a full pipe.
use crate::error::ToolError;
use crate::util::truncate_bytes;
use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_STDERR_EXCERPT_BYTES: usize = 2000;

/// Captured output of a successful tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    #[allow(dead_code)]
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Split a configured command line into argv.
pub fn split_command(raw: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(raw).with_context(|| format!("parse command: {raw}"))?;
    if argv.is_empty() {
        return Err(anyhow!("command is empty"));
    }
    Ok(argv)
}

/// Run `argv` to completion, feeding `stdin` if given, killing it after `timeout`.
///
/// A non-zero exit is an error carrying a stderr excerpt.
pub fn run_tool(
    argv: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let (program, args) = argv.split_first().ok_or(ToolError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    let writer = match (child.stdin.take(), stdin) {
        (Some(mut pipe), Some(bytes)) => {
            let bytes = bytes.to_vec();
            Some(thread::spawn(move || {
                // The child may exit without reading all of stdin; ignore a broken pipe.
                let _ = pipe.write_all(&bytes);
            }))
        }
        _ => None,
    };
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Wait {
                    program: program.clone(),
                    source,
                });
            }
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes open; leave the readers detached.
            tracing::warn!(program = %program, timeout_secs = timeout.as_secs(), "tool timed out");
            return Err(ToolError::TimedOut {
                program: program.clone(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let duration = start.elapsed();

    tracing::debug!(
        program = %program,
        elapsed_ms = duration.as_millis() as u64,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "tool run complete"
    );

    if !status.success() {
        return Err(ToolError::Failed {
            program: program.clone(),
            status: status
                .code()
                .map(|code| format!("status {code}"))
                .unwrap_or_else(|| "a signal".to_string()),
            stderr: truncate_bytes(&stderr, MAX_STDERR_EXCERPT_BYTES)
                .trim()
                .to_string(),
        });
    }
    Ok(ToolOutput {
        stdout,
        stderr,
        duration,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_stdout() {
        let output = run_tool(&sh("echo hello"), None, Duration::from_secs(10)).unwrap();
        assert_eq!(output.stdout_text().trim(), "hello");
    }

    #[test]
    fn feeds_stdin() {
        let output = run_tool(
            &sh("cat"),
            Some(b"prompt text".as_slice()),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(output.stdout_text(), "prompt text");
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let err = run_tool(&sh("echo boom >&2; exit 3"), None, Duration::from_secs(10))
            .unwrap_err();
        match err {
            ToolError::Failed { status, stderr, .. } => {
                assert_eq!(status, "status 3");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn kills_on_timeout() {
        let start = Instant::now();
        let err = run_tool(&sh("exec sleep 5"), None, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let argv = vec!["songprep-definitely-not-a-program".to_string()];
        let err = run_tool(&argv, None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn split_command_rejects_empty() {
        assert!(split_command("   ").is_err());
        assert_eq!(
            split_command("claude -p --model 'haiku 3'").unwrap(),
            vec!["claude", "-p", "--model", "haiku 3"]
        );
    }
}
