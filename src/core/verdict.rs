use std::fmt;

/// Overall classification of one build-and-run attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Built and ran to completion with exit code 0
    Completed,
    /// Built and ran, but exited with a non-zero code
    RuntimeError,
    /// Built and was killed by a signal
    Crashed,
    /// Built, but execution hit the wall-clock limit
    TimedOut,
    /// Built, execution disabled
    NotExecuted,
    /// Build failed or produced no executable
    BuildFailed,
}

impl Verdict {
    /// Whether the attempt counts as a successful run when filing.
    ///
    /// Only a failed build is a failure; timeouts and crashes still file as
    /// completed runs.
    pub fn counts_as_success(&self) -> bool {
        !matches!(self, Verdict::BuildFailed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Completed => "completed",
            Verdict::RuntimeError => "runtime_error",
            Verdict::Crashed => "crashed",
            Verdict::TimedOut => "timed_out",
            Verdict::NotExecuted => "not_executed",
            Verdict::BuildFailed => "build_failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_as_success() {
        assert!(Verdict::Completed.counts_as_success());
        assert!(Verdict::TimedOut.counts_as_success());
        assert!(Verdict::Crashed.counts_as_success());
        assert!(!Verdict::BuildFailed.counts_as_success());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Completed.to_string(), "completed");
        assert_eq!(Verdict::BuildFailed.to_string(), "build_failed");
        assert_eq!(Verdict::TimedOut.to_string(), "timed_out");
    }
}
