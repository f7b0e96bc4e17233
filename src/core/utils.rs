use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: PathBuf },
    #[error("{path} is not a {kind}")]
    WrongKind { kind: &'static str, path: PathBuf },
}

/// Return `path` if it exists and is a directory
pub fn require_dir(path: &Path, kind: &'static str) -> Result<PathBuf, PathError> {
    if !path.exists() {
        return Err(PathError::NotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(PathError::WrongKind {
            kind: "directory",
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// Return `path` if it exists and is a regular file
pub fn require_file(path: &Path, kind: &'static str) -> Result<PathBuf, PathError> {
    if !path.exists() {
        return Err(PathError::NotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(PathError::WrongKind {
            kind: "file",
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// Copy every non-directory entry of `src` into `dest`, returning the copies
pub fn copy_files(src: &Path, dest: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        if entry.metadata()?.is_dir() {
            continue;
        }
        let target = dest.join(entry.file_name());
        std::fs::copy(entry.path(), &target)?;
        copied.push(target);
    }
    copied.sort();
    Ok(copied)
}

/// Strip everything but word characters (pawprints, lab names)
pub fn sanitize_identifier(raw: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static regex"));
    re.replace_all(raw, "").into_owned()
}
