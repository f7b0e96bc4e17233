//! Per-section roster files
//!
//! Each grading section has one CSV file named after the section, with a
//! header row and `pawprint,canvas_id,name,date` rows. Files are
//! regenerated wholesale from Canvas and never edited row by row.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::{require_dir, sanitize_identifier, PathError};

/// Format of the `date` column (when the row was cached)
pub const ROSTER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum RosterError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("failed to read roster {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("failed to access roster {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad cache date {value:?} in roster {path}")]
    BadDate { path: PathBuf, value: String },
    #[error("{user} is listed in more than one section: {}", sections.join(", "))]
    DuplicateUser { user: String, sections: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub pawprint: String,
    pub canvas_id: String,
    pub name: String,
    pub date: String,
}

impl RosterRecord {
    pub fn new(
        pawprint: impl Into<String>,
        canvas_id: impl Into<String>,
        name: impl Into<String>,
        cached_at: NaiveDateTime,
    ) -> Self {
        Self {
            pawprint: pawprint.into(),
            canvas_id: canvas_id.into(),
            name: name.into(),
            date: cached_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }

    /// Pawprint with whitespace and punctuation stripped
    pub fn user_id(&self) -> String {
        sanitize_identifier(&self.pawprint)
    }

    pub fn cached_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date, ROSTER_DATE_FORMAT).ok()
    }
}

pub fn read_roster(path: &Path) -> Result<Vec<RosterRecord>, RosterError> {
    let csv_err = |source| RosterError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let record = row.map_err(csv_err)?;
        records.push(record.deserialize::<RosterRecord>(None).map_err(csv_err)?);
    }
    Ok(records)
}

pub fn write_roster(path: &Path, records: &[RosterRecord]) -> Result<(), RosterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RosterError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_err = |source| RosterError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    // header is written even for an empty roster
    writer
        .write_record(["pawprint", "canvas_id", "name", "date"])
        .map_err(csv_err)?;
    for record in records {
        writer
            .write_record([&record.pawprint, &record.canvas_id, &record.name, &record.date])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| RosterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {} roster entries to {}", records.len(), path.display());
    Ok(())
}

/// Whether the roster at `path` needs regenerating.
///
/// Every row carries the same cache date, so only the first is inspected.
pub fn is_stale(
    path: &Path,
    invalidation_days: i64,
    now: NaiveDateTime,
) -> Result<bool, RosterError> {
    if invalidation_days < 1 || !path.is_file() {
        return Ok(true);
    }
    let records = read_roster(path)?;
    let Some(first) = records.first() else {
        return Ok(true);
    };
    let cached_at = first.cached_at().ok_or_else(|| RosterError::BadDate {
        path: path.to_path_buf(),
        value: first.date.clone(),
    })?;
    Ok(cached_at <= now - Duration::days(invalidation_days))
}

/// Find the section whose roster lists `user`.
///
/// Scans every `*.csv` file in `roster_dir`; the section is the file stem.
pub fn resolve_section(roster_dir: &Path, user: &str) -> Result<Option<String>, RosterError> {
    let roster_dir = require_dir(roster_dir, "roster directory")?;
    let entries = fs::read_dir(&roster_dir).map_err(|source| RosterError::Io {
        path: roster_dir.clone(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();

    let mut sections = Vec::new();
    for file in files {
        let Some(section) = file.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if read_roster(&file)?.iter().any(|r| r.user_id() == user) {
            sections.push(section.to_string());
        }
    }

    debug!("Roster lookup for {}: {:?}", user, sections);
    match sections.len() {
        0 => Ok(None),
        1 => Ok(sections.pop()),
        _ => Err(RosterError::DuplicateUser {
            user: user.to_string(),
            sections,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-01-20 12:00:00.0", ROSTER_DATE_FORMAT).unwrap()
    }

    fn record(pawprint: &str, cached_at: NaiveDateTime) -> RosterRecord {
        RosterRecord::new(pawprint, "1001", "Doe, Jane", cached_at)
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosters/A.csv");
        let records = vec![record("jd123", now()), record("ab456", now())];

        write_roster(&path, &records).unwrap();
        let read = read_roster(&path).unwrap();

        assert_eq!(read, records);
        assert_eq!(read[0].cached_at(), Some(now()));
    }

    #[test]
    fn test_resolve_section() {
        let dir = tempfile::tempdir().unwrap();
        write_roster(&dir.path().join("A.csv"), &[record("jd123", now())]).unwrap();
        write_roster(&dir.path().join("B.csv"), &[record("ab456", now())]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ab456").unwrap();

        assert_eq!(
            resolve_section(dir.path(), "ab456").unwrap(),
            Some("B".to_string())
        );
        assert_eq!(resolve_section(dir.path(), "zz999").unwrap(), None);
    }

    #[test]
    fn test_resolve_sanitizes_pawprints() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("C.csv"),
            "pawprint,canvas_id,name,date\n\"jd123 \",1,\"Doe, Jane\",2025-01-01 00:00:00.000000\n",
        )
        .unwrap();

        assert_eq!(
            resolve_section(dir.path(), "jd123").unwrap(),
            Some("C".to_string())
        );
    }

    #[test]
    fn test_duplicate_user_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_roster(&dir.path().join("A.csv"), &[record("jd123", now())]).unwrap();
        write_roster(&dir.path().join("B.csv"), &[record("jd123", now())]).unwrap();

        let err = resolve_section(dir.path(), "jd123").unwrap_err();
        match err {
            RosterError::DuplicateUser { sections, .. } => assert_eq!(sections, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_roster_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_section(&dir.path().join("missing"), "jd123").unwrap_err();
        assert!(matches!(err, RosterError::Path(PathError::NotFound { .. })));
    }

    #[test]
    fn test_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.csv");

        assert!(is_stale(&path, 14, now()).unwrap());

        write_roster(&path, &[record("jd123", now() - Duration::days(3))]).unwrap();
        assert!(!is_stale(&path, 14, now()).unwrap());
        assert!(is_stale(&path, 2, now()).unwrap());
        assert!(is_stale(&path, 0, now()).unwrap());

        write_roster(&path, &[]).unwrap();
        assert!(is_stale(&path, 14, now()).unwrap());
    }
}
