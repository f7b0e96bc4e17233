use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

use labkit::backup::{BackupJob, BackupOverrides, StudentOutcome};
use labkit::canvas::CanvasClient;
use labkit::console;
use labkit::runner::ProcessRunner;
use labkit::{Config, ConfigError};

/// Stage a grader's lab submissions locally, building and running each one
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Lab name, e.g. lab3
    lab_name: String,
    /// Grader (Canvas group) name
    grader_name: String,
    /// Build but do not run submissions
    #[arg(long)]
    no_execute: bool,
    /// Only copy files
    #[arg(long)]
    no_compile: bool,
    /// Keep existing backups; students with an output.log are skipped
    #[arg(long)]
    no_clear: bool,
    /// Build with the Makefile instead of compiling the source directly
    #[arg(long, conflicts_with = "no_make")]
    make: bool,
    /// Compile the submitted source directly, ignoring any Makefile
    #[arg(long)]
    no_make: bool,
    /// Text written to each program's stdin
    #[arg(long)]
    input: Option<String>,
    /// Skip students who missed the attendance criterion
    #[arg(long)]
    attendance: bool,
    /// Canvas course id
    #[arg(long)]
    course_id: Option<i64>,
    /// Canvas API token
    #[arg(long, env = "CANVAS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl Cli {
    fn overrides(&self) -> BackupOverrides {
        BackupOverrides {
            no_execute: self.no_execute,
            no_compile: self.no_compile,
            no_clear: self.no_clear,
            make: self.make,
            no_make: self.no_make,
            input: self.input.clone(),
            attendance: self.attendance,
            course_id: self.course_id,
            token: self.token.clone(),
        }
    }
}

async fn backup(cli: Cli) -> Result<bool> {
    let config_path = Config::default_path();
    let config = match Config::load_or_init(&config_path) {
        Ok(config) => config,
        Err(ConfigError::CreatedDefault(path)) => {
            console::warning(format!(
                "{} did not exist; a default was created. Edit it with your class information and run again.",
                path.display()
            ));
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    let config = cli.overrides().apply(config);

    let work_root = std::env::current_dir().context("Failed to resolve the working directory")?;
    let runner = ProcessRunner::new();
    let canvas = CanvasClient::from_config(&config.canvas);
    let job = BackupJob::new(
        &config,
        &cli.lab_name,
        &cli.grader_name,
        &work_root,
        &runner,
        &canvas,
    )?;

    let now = chrono::Local::now().naive_local();
    let summary = job.run(now).await?;

    let processed = summary.count(|o| matches!(o, StudentOutcome::Processed(_)));
    let missing = summary.count(|o| matches!(o, StudentOutcome::NoSubmission));
    let failed = summary.count(|o| matches!(o, StudentOutcome::Failed(_)));
    info!(
        "Backup finished: students={}, processed={}, missing={}, failed={}",
        summary.students.len(),
        processed,
        missing,
        failed
    );
    console::success(format!(
        "Backed up {} of {} students into {}",
        summary.students.len() - missing,
        summary.students.len(),
        summary.lab_dir.display()
    ));
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = console::init_tracing() {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    let cli = Cli::parse();
    match backup(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Backup aborted: {:#}", e);
            console::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
