//! Valgrind report scanning
//!
//! Only two facts are pulled out of the memcheck stream: the error count
//! from the `ERROR SUMMARY` line and whether valgrind confirmed that no
//! leaks are possible. Both are advisory.

use regex::Regex;
use std::sync::OnceLock;

const NO_LEAKS: &str = "All heap blocks were freed -- no leaks are possible";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcheckReport {
    /// Count from `ERROR SUMMARY: N errors`, `None` if the line is absent
    pub error_count: Option<u64>,
    pub leak_free: bool,
    pub raw: String,
}

impl MemcheckReport {
    pub fn parse(stderr: &str) -> Self {
        static ERRORS: OnceLock<Regex> = OnceLock::new();
        let re = ERRORS.get_or_init(|| {
            Regex::new(r"ERROR SUMMARY:\s*([0-9,]+)\s+errors?").expect("static regex")
        });

        let error_count = re
            .captures(stderr)
            .and_then(|cap| cap[1].replace(',', "").parse::<u64>().ok());

        Self {
            error_count,
            leak_free: stderr.contains(NO_LEAKS),
            raw: stderr.to_string(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count.is_some_and(|n| n > 0)
    }

    /// Human readable warnings, empty when the report is clean
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(n) = self.error_count.filter(|n| *n > 0) {
            warnings.push(format!("valgrind reported {} memory error(s)", n));
        }
        if !self.leak_free {
            warnings.push("valgrind could not confirm that all heap blocks were freed".to_string());
        }
        warnings
    }
}
