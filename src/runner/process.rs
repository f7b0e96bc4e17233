//! Direct process runner
//!
//! Spawns the command on the host with piped stdio and enforces the
//! wall-clock limit by dropping (and thereby killing) the child.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunOutcome, RunStatus, Runner};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        debug!("Running {:?} (timeout {:?})", cmd.to_vec(), timeout);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;

        // Feed stdin from a separate task so a child that writes before
        // reading can't deadlock against us.
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let input = input.to_owned();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!("stdin closed early: {}", e);
                }
            });
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.with_context(|| format!("Failed to wait for {}", cmd.program))?,
            Err(_) => {
                warn!("{} exceeded {:?}, killed", cmd.program, timeout);
                return Ok(RunOutcome {
                    status: RunStatus::TimedOut,
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
        };

        let status = match (output.status.code(), output.status.signal()) {
            (Some(code), _) => RunStatus::Exited(code),
            (None, Some(sig)) => RunStatus::Signaled(sig),
            (None, None) => RunStatus::Exited(-1),
        };

        Ok(RunOutcome {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let outcome = ProcessRunner::new()
            .run(&sh("echo out; echo err >&2; exit 3"), Duration::from_secs(5), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(3));
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let outcome = ProcessRunner::new()
            .run(&sh("read line; echo got $line"), Duration::from_secs(5), Some("42\n"))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "got 42\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let outcome = ProcessRunner::new()
            .run(&sh("sleep 5"), Duration::from_millis(200), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_signal_is_decoded() {
        let outcome = ProcessRunner::new()
            .run(&sh("kill -SEGV $$"), Duration::from_secs(5), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Signaled(11));
        assert_eq!(outcome.status.signal_name(), Some("SIGSEGV"));
    }

    #[tokio::test]
    async fn test_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let outcome = ProcessRunner::new()
            .run(&sh("ls").with_work_dir(dir.path()), Duration::from_secs(5), None)
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "marker.txt\n");
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let result = tokio_test::block_on(ProcessRunner::new().run(
            &CommandSpec::new("/definitely/not/a/program"),
            Duration::from_secs(1),
            None,
        ));
        assert!(result.is_err());
    }
}
