//! Lab header convention: a submission for `lab3` must contain a line
//! starting with `#include "lab3.h"`.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

fn include_pattern(lab: &str) -> Result<Regex> {
    let pattern = format!(r#"^#include\s*"{}\.h""#, regex::escape(lab));
    Regex::new(&pattern).context("Failed to build header pattern")
}

/// Whether `source` includes the header named after `lab`
pub fn includes_lab_header(source: &str, lab: &str) -> Result<bool> {
    let re = include_pattern(lab)?;
    Ok(source.lines().any(|line| re.is_match(line)))
}

pub fn file_includes_lab_header(path: &Path, lab: &str) -> Result<bool> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read submission {}", path.display()))?;
    includes_lab_header(&String::from_utf8_lossy(&bytes), lab)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_present() {
        let source = "#include <stdio.h>\n#include \"lab3.h\"\n\nint main(void) { return 0; }\n";
        assert!(includes_lab_header(source, "lab3").unwrap());
    }

    #[test]
    fn test_header_spacing() {
        assert!(includes_lab_header("#include\"lab3.h\"", "lab3").unwrap());
        assert!(includes_lab_header("#include   \"lab3.h\"", "lab3").unwrap());
    }

    #[test]
    fn test_header_missing() {
        let source = "#include <stdio.h>\nint main(void) { return 0; }\n";
        assert!(!includes_lab_header(source, "lab3").unwrap());
    }

    #[test]
    fn test_other_lab_header_does_not_count() {
        assert!(!includes_lab_header("#include \"lab4.h\"", "lab3").unwrap());
        assert!(!includes_lab_header("#include \"lab3xh\"", "lab3").unwrap());
        assert!(!includes_lab_header("// #include \"lab3.h\"", "lab3").unwrap());
    }
}
