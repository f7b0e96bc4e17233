//! Submission window table
//!
//! The table is an externally maintained CSV with a header row followed by
//! `lab_name,start_date,end_date` rows. Every row is parsed up front, so a
//! single malformed row fails the whole check.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Timestamp format used by the window table and filed submission names
pub const WINDOW_DATE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("lab window table not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read lab window table {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("bad {field} timestamp {value:?} for {lab} (expected YYYY-MM-DD_HH:MM:SS)")]
    BadTimestamp {
        lab: String,
        field: &'static str,
        value: String,
    },
    #[error("{lab} closes before it opens")]
    InvertedWindow { lab: String },
    #[error("{0} appears more than once in the lab window table")]
    DuplicateLab(String),
}

#[derive(Debug, Deserialize)]
struct RawWindow {
    lab_name: String,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabWindow {
    pub lab_id: String,
    pub opens_at: NaiveDateTime,
    pub closes_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Unknown,
    BeforeWindow,
    WithinWindow,
    AfterWindow,
}

impl WindowStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, WindowStatus::WithinWindow)
    }
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowStatus::Unknown => "unknown lab",
            WindowStatus::BeforeWindow => "before window",
            WindowStatus::WithinWindow => "within window",
            WindowStatus::AfterWindow => "after window",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowTable {
    windows: Vec<LabWindow>,
}

impl WindowTable {
    pub fn load(path: &Path) -> Result<Self, WindowError> {
        if !path.is_file() {
            return Err(WindowError::Missing(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| WindowError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        let table = Self::from_reader(reader, path)?;
        debug!(
            "Loaded {} lab windows from {}",
            table.windows.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_csv_str(content: &str) -> Result<Self, WindowError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        Self::from_reader(reader, Path::new("<inline>"))
    }

    fn from_reader<R: std::io::Read>(
        mut reader: csv::Reader<R>,
        path: &Path,
    ) -> Result<Self, WindowError> {
        let mut windows = Vec::new();
        let mut seen = HashSet::new();

        // header text is ignored, columns are positional
        for row in reader.records() {
            let raw: RawWindow = row
                .and_then(|record| record.deserialize(None))
                .map_err(|source| WindowError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?;

            if !seen.insert(raw.lab_name.clone()) {
                return Err(WindowError::DuplicateLab(raw.lab_name));
            }

            let opens_at = parse_timestamp(&raw.lab_name, "start", &raw.start_date)?;
            let closes_at = parse_timestamp(&raw.lab_name, "end", &raw.end_date)?;
            if closes_at < opens_at {
                return Err(WindowError::InvertedWindow { lab: raw.lab_name });
            }

            windows.push(LabWindow {
                lab_id: raw.lab_name,
                opens_at,
                closes_at,
            });
        }

        Ok(Self { windows })
    }

    pub fn get(&self, lab: &str) -> Option<&LabWindow> {
        self.windows.iter().find(|w| w.lab_id == lab)
    }

    /// Classify `now` against the window for `lab`. Bounds are exclusive.
    pub fn check(&self, lab: &str, now: NaiveDateTime) -> WindowStatus {
        match self.get(lab) {
            None => WindowStatus::Unknown,
            Some(window) if now <= window.opens_at => WindowStatus::BeforeWindow,
            Some(window) if now >= window.closes_at => WindowStatus::AfterWindow,
            Some(_) => WindowStatus::WithinWindow,
        }
    }
}

fn parse_timestamp(lab: &str, field: &'static str, value: &str) -> Result<NaiveDateTime, WindowError> {
    NaiveDateTime::parse_from_str(value, WINDOW_DATE_FORMAT).map_err(|_| {
        WindowError::BadTimestamp {
            lab: lab.to_string(),
            field,
            value: value.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "lab_name,start_date,end_date\n\
                         lab3,2025-01-01_00:00:00,2025-01-10_00:00:00\n\
                         lab4,2025-01-10_00:00:00,2025-01-17_00:00:00\n";

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, WINDOW_DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_within_window() {
        let table = WindowTable::from_csv_str(TABLE).unwrap();
        assert_eq!(
            table.check("lab3", ts("2025-01-05_12:00:00")),
            WindowStatus::WithinWindow
        );
    }

    #[test]
    fn test_after_window() {
        let table = WindowTable::from_csv_str(TABLE).unwrap();
        assert_eq!(
            table.check("lab3", ts("2025-02-01_00:00:00")),
            WindowStatus::AfterWindow
        );
    }

    #[test]
    fn test_before_window() {
        let table = WindowTable::from_csv_str(TABLE).unwrap();
        assert_eq!(
            table.check("lab4", ts("2025-01-05_12:00:00")),
            WindowStatus::BeforeWindow
        );
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let table = WindowTable::from_csv_str(TABLE).unwrap();
        assert_eq!(
            table.check("lab3", ts("2025-01-01_00:00:00")),
            WindowStatus::BeforeWindow
        );
        assert_eq!(
            table.check("lab3", ts("2025-01-10_00:00:00")),
            WindowStatus::AfterWindow
        );
        assert_eq!(
            table.check("lab3", ts("2025-01-09_23:59:59")),
            WindowStatus::WithinWindow
        );
    }

    #[test]
    fn test_unknown_lab_is_never_open() {
        let table = WindowTable::from_csv_str(TABLE).unwrap();
        for now in ["2024-12-31_00:00:00", "2025-01-05_12:00:00", "2026-01-01_00:00:00"] {
            let status = table.check("lab9", ts(now));
            assert_eq!(status, WindowStatus::Unknown);
            assert!(!status.is_open());
        }
    }

    #[test]
    fn test_malformed_row_fails_whole_table() {
        let content = "lab_name,start_date,end_date\n\
                       lab3,2025-01-01_00:00:00,2025-01-10_00:00:00\n\
                       lab4,2025/01/10,2025-01-17_00:00:00\n";
        let err = WindowTable::from_csv_str(content).unwrap_err();
        assert!(matches!(err, WindowError::BadTimestamp { field: "start", .. }));
    }

    #[test]
    fn test_duplicate_lab_rejected() {
        let content = "lab_name,start_date,end_date\n\
                       lab3,2025-01-01_00:00:00,2025-01-10_00:00:00\n\
                       lab3,2025-02-01_00:00:00,2025-02-10_00:00:00\n";
        let err = WindowTable::from_csv_str(content).unwrap_err();
        assert!(matches!(err, WindowError::DuplicateLab(ref lab) if lab == "lab3"));
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = WindowTable::load(&dir.path().join("windows.csv")).unwrap_err();
        assert!(matches!(err, WindowError::Missing(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("windows.csv");
        std::fs::write(&path, TABLE).unwrap();

        let table = WindowTable::load(&path).unwrap();
        let window = table.get("lab4").unwrap();
        assert_eq!(window.opens_at, ts("2025-01-10_00:00:00"));
    }
}
