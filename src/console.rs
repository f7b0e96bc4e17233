//! User-facing console lines
//!
//! Diagnostics go through `tracing`; what the student or TA is meant to
//! read goes through here, colour coded by severity.

use colored::Colorize;

pub fn status(message: impl AsRef<str>) {
    println!("{}", message.as_ref().blue());
}

pub fn success(message: impl AsRef<str>) {
    println!("{}", message.as_ref().green());
}

pub fn warning(message: impl AsRef<str>) {
    println!("{}", format!("(WARNING) {}", message.as_ref()).yellow());
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("{}", format!("(ERROR) {}", message.as_ref()).red());
}

/// Print a captured block (compiler diagnostics, program output) verbatim
pub fn block(title: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    println!("{}", format!("---- {} ----", title).bold());
    print!("{}", body);
    if !body.ends_with('\n') {
        println!();
    }
}

/// Install the tracing subscriber used by both binaries
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("labkit=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
