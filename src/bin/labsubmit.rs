use anyhow::{Context, Result};
use clap::Parser;
use nix::unistd::{getuid, User};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};

use labkit::console;
use labkit::runner::ProcessRunner;
use labkit::submit::{run_submission, SubmitRequest};
use labkit::{Config, ConfigError};

/// Submit a lab source file for checking and filing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Class code, e.g. cs2050
    class_code: String,
    /// Lab name, e.g. lab3
    lab_name: String,
    /// Source file to submit
    file: PathBuf,
}

fn current_user() -> Result<String> {
    let uid = getuid();
    let user = User::from_uid(uid)
        .context("Failed to look up the current user")?
        .with_context(|| format!("No passwd entry for uid {}", uid))?;
    Ok(user.name)
}

async fn submit(cli: Cli) -> Result<bool> {
    let config_path = Config::default_path();
    let config = match Config::load_or_init(&config_path) {
        Ok(config) => config,
        Err(ConfigError::CreatedDefault(path)) => {
            console::warning(format!(
                "{} did not exist; a default was created. Edit it and run again.",
                path.display()
            ));
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let request = SubmitRequest {
        user: current_user()?,
        class_code: cli.class_code,
        lab: cli.lab_name,
        file: cli.file,
    };
    debug!("Submitting {:?}", request);

    let now = chrono::Local::now().naive_local();
    let attempt = run_submission(&config, &request, &ProcessRunner::new(), now).await?;
    Ok(attempt.is_valid())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = console::init_tracing() {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    let cli = Cli::parse();
    match submit(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Submission aborted: {:#}", e);
            console::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
