//! Runner module - subprocess abstraction
//!
//! Build, execution and memory checking all go through a [`Runner`] and get
//! back the same typed [`RunOutcome`]:
//! - exit kind (`Exited`, `Signaled`, `TimedOut`)
//! - captured stdout and stderr
//!
//! The runner module does NOT decide whether an attempt succeeded; that is
//! the executor's job.

pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
    /// Wall-clock limit hit; the child was killed
    TimedOut,
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }

    /// Symbolic name of the terminating signal, e.g. `SIGSEGV`
    pub fn signal_name(&self) -> Option<&'static str> {
        match self {
            RunStatus::Signaled(sig) => Signal::try_from(*sig).ok().map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Outcome of running a program
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            status: RunStatus::Exited(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command under a wall-clock limit with optional stdin
    async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        stdin: Option<&str>,
    ) -> Result<RunOutcome>;
}

pub use process::ProcessRunner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_vec() {
        let cmd = CommandSpec::from_vec(&["gcc".to_string(), "-Wall".to_string()])
            .with_arg("lab3.c");
        assert_eq!(cmd.program, "gcc");
        assert_eq!(cmd.to_vec(), vec!["gcc", "-Wall", "lab3.c"]);
    }

    #[test]
    fn test_signal_name() {
        assert_eq!(RunStatus::Signaled(11).signal_name(), Some("SIGSEGV"));
        assert_eq!(RunStatus::Signaled(6).signal_name(), Some("SIGABRT"));
        assert_eq!(RunStatus::Exited(139).signal_name(), None);
    }
}
