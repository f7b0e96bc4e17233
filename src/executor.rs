//! Build-and-run executor
//!
//! One attempt walks: build → execute → optional memcheck. Only a failed
//! build makes the attempt unsuccessful; timeouts, crashes and memcheck
//! findings are reported as warnings on top of the verdict.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::compiler::{build, BuildCommands, BuildMode, CompileResult};
use crate::config::GeneralConfig;
use crate::core::Verdict;
use crate::memcheck::MemcheckReport;
use crate::runner::{CommandSpec, RunOutcome, RunStatus, Runner};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub commands: BuildCommands,
    pub compile: bool,
    pub execute: bool,
    pub memcheck: bool,
    pub memcheck_command: Vec<String>,
    pub timeout: Duration,
    pub stdin: Option<String>,
}

impl ExecutorOptions {
    pub fn from_config(general: &GeneralConfig) -> Self {
        Self {
            commands: BuildCommands::from_config(general),
            compile: general.compile_submissions,
            execute: general.execute_submissions,
            memcheck: general.generate_valgrind_output,
            memcheck_command: general.memcheck_command.clone(),
            timeout: Duration::from_secs(general.execution_timeout),
            stdin: general.stdin_input().map(str::to_owned),
        }
    }
}

/// Everything observed during one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub verdict: Verdict,
    /// `None` when compilation is disabled
    pub build: Option<CompileResult>,
    pub run: Option<RunOutcome>,
    pub memcheck: Option<MemcheckReport>,
    pub warnings: Vec<String>,
}

impl AttemptReport {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            build: None,
            run: None,
            memcheck: None,
            warnings: Vec::new(),
        }
    }

    /// The boolean the filing decision consults
    pub fn succeeded(&self) -> bool {
        self.verdict.counts_as_success()
    }

    pub fn build_message(&self) -> Option<&str> {
        self.build.as_ref().and_then(|b| b.message.as_deref())
    }
}

pub struct Executor<'a> {
    runner: &'a dyn Runner,
    options: ExecutorOptions,
}

impl<'a> Executor<'a> {
    pub fn new(runner: &'a dyn Runner, options: ExecutorOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub async fn execute(&self, dir: &Path, mode: &BuildMode) -> AttemptReport {
        if !self.options.compile {
            debug!("Compilation disabled, skipping build of {}", dir.display());
            return AttemptReport::new(Verdict::NotExecuted);
        }

        let compiled = build(self.runner, dir, mode, &self.options.commands).await;
        let executable = match (&compiled.executable, compiled.success) {
            (Some(exe), true) => exe.clone(),
            _ => {
                info!("Build failed in {}", dir.display());
                let mut report = AttemptReport::new(Verdict::BuildFailed);
                report.build = Some(compiled);
                return report;
            }
        };

        let mut report = AttemptReport::new(Verdict::NotExecuted);
        report.build = Some(compiled);
        if !self.options.execute {
            return report;
        }

        let cmd = CommandSpec::new(executable.to_string_lossy()).with_work_dir(dir);
        let run = match self
            .runner
            .run(&cmd, self.options.timeout, self.options.stdin.as_deref())
            .await
        {
            Ok(run) => run,
            Err(e) => {
                warn!("Could not execute {}: {:#}", executable.display(), e);
                report
                    .warnings
                    .push(format!("The program could not be executed: {:#}", e));
                return report;
            }
        };

        report.verdict = classify_run(&run.status);
        if let Some(warning) = describe_run(&run.status, self.options.timeout) {
            report.warnings.push(warning);
        }
        let timed_out = run.status == RunStatus::TimedOut;
        report.run = Some(run);

        if self.options.memcheck && !timed_out {
            self.memcheck(dir, &executable.to_string_lossy(), &mut report)
                .await;
        }

        report
    }

    async fn memcheck(&self, dir: &Path, executable: &str, report: &mut AttemptReport) {
        let cmd = CommandSpec::from_vec(&self.options.memcheck_command)
            .with_arg(executable)
            .with_work_dir(dir);

        match self
            .runner
            .run(&cmd, self.options.timeout, self.options.stdin.as_deref())
            .await
        {
            Ok(outcome) if outcome.status == RunStatus::TimedOut => {
                report
                    .warnings
                    .push("The memory check took too long and was stopped".to_string());
            }
            Ok(outcome) => {
                let parsed = MemcheckReport::parse(&outcome.stderr);
                report.warnings.extend(parsed.warnings());
                report.memcheck = Some(parsed);
            }
            Err(e) => {
                warn!("Memory checker unavailable: {:#}", e);
                report
                    .warnings
                    .push(format!("The memory check could not be run: {:#}", e));
            }
        }
    }
}

fn classify_run(status: &RunStatus) -> Verdict {
    match status {
        RunStatus::Exited(0) => Verdict::Completed,
        RunStatus::Exited(_) => Verdict::RuntimeError,
        RunStatus::Signaled(_) => Verdict::Crashed,
        RunStatus::TimedOut => Verdict::TimedOut,
    }
}

/// Friendly diagnostic for a run that did not exit cleanly
fn describe_run(status: &RunStatus, timeout: Duration) -> Option<String> {
    match status {
        RunStatus::Exited(0) => None,
        RunStatus::Exited(code) => Some(format!("The program exited with code {}", code)),
        RunStatus::TimedOut => Some(format!(
            "The program took longer than {} seconds and was stopped",
            timeout.as_secs()
        )),
        RunStatus::Signaled(_) => {
            let name = status.signal_name().unwrap_or("an unknown signal");
            let hint = match name {
                "SIGSEGV" => " (segmentation fault: check pointer use and array bounds)",
                "SIGFPE" => " (arithmetic error, e.g. division by zero)",
                "SIGABRT" => " (aborted, e.g. a failed assert or double free)",
                _ => "",
            };
            Some(format!("The program was terminated by {}{}", name, hint))
        }
    }
}
