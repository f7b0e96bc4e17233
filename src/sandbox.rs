//! Per-attempt working directory
//!
//! A sandbox is a fresh, uniquely named temporary directory holding the
//! lab's support files and the submitted file. It is removed when the
//! [`Sandbox`] is dropped, so every exit path of the caller cleans up.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::{copy_files, require_dir, require_file};

#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    submission: PathBuf,
}

impl Sandbox {
    /// Create a sandbox under the system temp directory
    pub fn prepare(support_dir: &Path, submitted_file: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("labkit-")
            .tempdir()
            .context("Failed to create sandbox directory")?;
        Self::populate(dir, support_dir, submitted_file)
    }

    /// Create a sandbox under `parent`
    pub fn prepare_in(parent: &Path, support_dir: &Path, submitted_file: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("labkit-")
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create sandbox in {}", parent.display()))?;
        Self::populate(dir, support_dir, submitted_file)
    }

    fn populate(dir: TempDir, support_dir: &Path, submitted_file: &Path) -> Result<Self> {
        let support_dir = require_dir(support_dir, "lab support directory")?;
        let submitted_file = require_file(submitted_file, "submitted file")?;

        let copied = copy_files(&support_dir, dir.path()).with_context(|| {
            format!(
                "Failed to copy support files from {}",
                support_dir.display()
            )
        })?;
        debug!("Copied {} support files into sandbox", copied.len());

        let file_name = submitted_file
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid submission path: {}", submitted_file.display()))?;
        let submission = dir.path().join(file_name);
        std::fs::copy(&submitted_file, &submission).with_context(|| {
            format!(
                "Failed to copy {} into sandbox",
                submitted_file.display()
            )
        })?;

        info!("Prepared sandbox at {}", dir.path().display());
        Ok(Self { dir, submission })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The submitted file's copy inside the sandbox
    pub fn submission(&self) -> &Path {
        &self.submission
    }
}
