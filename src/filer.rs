//! Submission filing
//!
//! Layout under a section directory:
//!
//! ```text
//! {section}/valid/{user}_{timestamp}/{file}
//! {section}/invalid/{user}_{timestamp}/{file}
//! {section}/{user} -> {section}/valid/{user}_{timestamp}
//! ```
//!
//! The per-user symlink always names the most recent valid filing. It is
//! replaced by unlink-then-relink, which is not atomic against a
//! concurrent submission by the same user.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PathsConfig;
use crate::window::WINDOW_DATE_FORMAT;

/// Filed directory: group may read and traverse, no public access
pub const VALID_DIR_MODE: u32 = 0o750;
/// Filed file: owner and group read only
pub const VALID_FILE_MODE: u32 = 0o440;

#[derive(Debug, Clone, PartialEq)]
pub struct FiledSubmission {
    pub valid: bool,
    pub dir: PathBuf,
    pub file: PathBuf,
    /// Set for valid filings
    pub link: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Filer {
    section_dir: PathBuf,
    valid_dir: PathBuf,
    invalid_dir: PathBuf,
}

impl Filer {
    pub fn new(section_dir: impl Into<PathBuf>, valid_name: &str, invalid_name: &str) -> Self {
        let section_dir = section_dir.into();
        Self {
            valid_dir: section_dir.join(valid_name),
            invalid_dir: section_dir.join(invalid_name),
            section_dir,
        }
    }

    pub fn from_config(section_dir: impl Into<PathBuf>, paths: &PathsConfig) -> Self {
        Self::new(section_dir, &paths.valid_dir, &paths.invalid_dir)
    }

    pub fn section_dir(&self) -> &Path {
        &self.section_dir
    }

    /// Where the latest-valid symlink for `user` lives
    pub fn link_path(&self, user: &str) -> PathBuf {
        self.section_dir.join(user)
    }

    /// Copy `source` into the valid or invalid tree and, for valid
    /// filings, lock it down and re-point the user's symlink.
    pub fn file(
        &self,
        user: &str,
        source: &Path,
        valid: bool,
        now: NaiveDateTime,
    ) -> Result<FiledSubmission> {
        let link = self.link_path(user);
        if valid {
            if let Ok(meta) = fs::symlink_metadata(&link) {
                if !meta.file_type().is_symlink() {
                    bail!(
                        "{} exists and is not a submission link; refusing to file",
                        link.display()
                    );
                }
            }
        }

        for dir in [&self.valid_dir, &self.invalid_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid submission path: {}", source.display()))?;
        let parent = if valid {
            &self.valid_dir
        } else {
            &self.invalid_dir
        };
        let dir = parent.join(format!("{}_{}", user, now.format(WINDOW_DATE_FORMAT)));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let file = dir.join(file_name);
        fs::copy(source, &file)
            .with_context(|| format!("Failed to copy submission to {}", file.display()))?;
        debug!("Copied {} to {}", source.display(), file.display());

        if !valid {
            info!("Filed invalid submission at {}", dir.display());
            return Ok(FiledSubmission {
                valid,
                dir,
                file,
                link: None,
            });
        }

        fs::set_permissions(&file, fs::Permissions::from_mode(VALID_FILE_MODE))
            .with_context(|| format!("Failed to set permissions on {}", file.display()))?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(VALID_DIR_MODE))
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;

        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link)
                .with_context(|| format!("Failed to remove old link {}", link.display()))?;
        }
        let target = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        symlink(&target, &link)
            .with_context(|| format!("Failed to link {} -> {}", link.display(), target.display()))?;

        info!("Filed valid submission at {}", dir.display());
        Ok(FiledSubmission {
            valid,
            dir,
            file,
            link: Some(link),
        })
    }
}
