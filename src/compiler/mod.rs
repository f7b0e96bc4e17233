//! Compiler module - building a submission
//!
//! Two build modes:
//! - project build: the directory ships a Makefile, run the build tool
//! - single file: invoke the configured compiler on the submitted file
//!
//! Either way the result is a pass/fail plus the diagnostic text to show.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::runner::{CommandSpec, RunStatus, Runner};

/// Wall-clock limit for a build
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(60);

const MAKEFILE_NAMES: [&str; 2] = ["Makefile", "makefile"];

#[derive(Debug, Clone, PartialEq)]
pub enum BuildMode {
    /// Invoke the build tool in the directory
    Project,
    /// Compile one source file directly
    SingleFile { source: PathBuf },
}

impl BuildMode {
    /// Project build when a Makefile is present, otherwise compile `source`
    pub fn detect(dir: &Path, source: &Path) -> Self {
        if MAKEFILE_NAMES.iter().any(|name| dir.join(name).is_file()) {
            BuildMode::Project
        } else {
            BuildMode::SingleFile {
                source: source.to_path_buf(),
            }
        }
    }
}

/// Commands used to build, taken from `[general]`
#[derive(Debug, Clone, PartialEq)]
pub struct BuildCommands {
    pub compile_command: Vec<String>,
    pub build_command: Vec<String>,
    pub executable_name: String,
}

impl BuildCommands {
    pub fn from_config(general: &crate::config::GeneralConfig) -> Self {
        Self {
            compile_command: general.compile_command.clone(),
            build_command: general.build_command.clone(),
            executable_name: general.executable_name.clone(),
        }
    }

    fn command_for(&self, dir: &Path, mode: &BuildMode) -> CommandSpec {
        let cmd = match mode {
            BuildMode::Project => CommandSpec::from_vec(&self.build_command),
            BuildMode::SingleFile { source } => CommandSpec::from_vec(&self.compile_command)
                .with_arg("-o")
                .with_arg(self.executable_name.clone())
                .with_arg(source.strip_prefix(dir).unwrap_or(source).to_string_lossy()),
        };
        cmd.with_work_dir(dir)
    }
}

/// Result of a build attempt
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub success: bool,
    /// Diagnostics to surface when the build failed
    pub message: Option<String>,
    pub executable: Option<PathBuf>,
}

impl CompileResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            executable: None,
        }
    }
}

/// Build inside `dir`. A build that exits 0 but leaves no executable fails.
pub async fn build(
    runner: &dyn Runner,
    dir: &Path,
    mode: &BuildMode,
    commands: &BuildCommands,
) -> CompileResult {
    let cmd = commands.command_for(dir, mode);
    debug!("Building with {:?}", cmd.to_vec());

    let result = match runner.run(&cmd, BUILD_TIMEOUT, None).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Build command could not be started: {:#}", e);
            return CompileResult::failed(format!("Failed to run {}: {:#}", cmd.program, e));
        }
    };

    if !result.is_success() {
        let message = if !result.stderr.is_empty() {
            result.stderr
        } else if !result.stdout.is_empty() {
            result.stdout
        } else {
            match result.status {
                RunStatus::TimedOut => "Compilation timed out".to_string(),
                RunStatus::Signaled(_) => "Compiler crashed".to_string(),
                RunStatus::Exited(code) => format!("Compilation failed with exit code {}", code),
            }
        };
        return CompileResult::failed(message);
    }

    let executable = dir.join(&commands.executable_name);
    if !executable.is_file() {
        return CompileResult::failed(format!(
            "Build succeeded but did not produce {}",
            commands.executable_name
        ));
    }

    let executable = executable.canonicalize().unwrap_or(executable);
    info!("Built {}", executable.display());
    CompileResult {
        success: true,
        message: None,
        executable: Some(executable),
    }
}
