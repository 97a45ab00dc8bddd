//! The assembled outcome of one run.

use serde::{Deserialize, Serialize};

use crate::check::types::{CheckResult, ErrorKind};
use crate::config::Result;

/// Ordered results plus the counts a caller needs to tell "all checks ran
/// and some failed" apart from "the run was cut short".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// Checks the suite declares
    pub declared: usize,
    /// Checks whose verification logic actually ran
    pub attempted: usize,
    pub passed: usize,
    pub failed: usize,
    /// Results in arrival order; never reordered
    pub results: Vec<CheckResult>,
    /// Out-of-band worker output and harness notes
    pub transcript: Vec<String>,
    pub wall_time_ms: u64,
}

impl RunReport {
    /// True when nothing failed or errored. Gated checks reported as
    /// unknown do not count against success.
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }

    /// True when not every declared check got to run.
    pub fn cut_short(&self) -> bool {
        self.attempted < self.declared
    }

    /// The most severe infrastructure error in the report, if any.
    pub fn fatal_error(&self) -> Option<ErrorKind> {
        for kind in [
            ErrorKind::SupervisorError,
            ErrorKind::Timeout,
            ErrorKind::ConfigurationError,
        ] {
            if self.results.iter().any(|r| r.error_kind == Some(kind)) {
                return Some(kind);
            }
        }
        None
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text rendering: one marker line per result, a summary line,
    /// and the transcript when there is one. No colors here; that is the
    /// caller's concern.
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let marker = match (result.passed, result.error_kind) {
                (Some(true), _) => "pass ",
                (None, _) => "skip ",
                (Some(false), Some(kind)) => match kind {
                    ErrorKind::AssertionFailure => "FAIL ",
                    ErrorKind::VerificationError => "ERROR",
                    ErrorKind::ConfigurationError => "FATAL",
                    ErrorKind::Timeout => "TIME ",
                    ErrorKind::SupervisorError => "DEAD ",
                },
                (Some(false), None) => "FAIL ",
            };
            out.push_str(marker);
            out.push_str("  ");
            out.push_str(&result.description);
            if !result.message.is_empty() {
                out.push_str(" - ");
                out.push_str(&result.message);
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "{} of {} checks passed ({} declared, {} attempted)\n",
            self.passed, self.attempted, self.declared, self.attempted
        ));
        if self.cut_short() {
            out.push_str("run was cut short\n");
        }
        if !self.transcript.is_empty() {
            out.push_str("--- output ---\n");
            for line in &self.transcript {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::types::{CheckId, CheckResult};

    fn report(results: Vec<CheckResult>) -> RunReport {
        let passed = results.iter().filter(|r| r.passed == Some(true)).count();
        let failed = results.iter().filter(|r| r.passed == Some(false)).count();
        RunReport {
            run_id: "r-1".to_string(),
            declared: results.len(),
            attempted: results.iter().filter(|r| r.passed.is_some()).count(),
            passed,
            failed,
            results,
            transcript: Vec::new(),
            wall_time_ms: 12,
        }
    }

    #[test]
    fn test_success_ignores_unknown_results() {
        let report = report(vec![
            CheckResult::passed(CheckId::new("a"), "a works", ""),
            CheckResult::unknown(CheckId::new("b"), "b is gated", "skipped"),
        ]);
        assert!(report.succeeded());
        assert!(report.fatal_error().is_none());
    }

    #[test]
    fn test_timeout_is_fatal_and_cut_short() {
        let mut r = report(vec![CheckResult::error(
            CheckId::new("timeout"),
            "uses a loop",
            "timeout (1s) reached during: uses a loop",
            ErrorKind::Timeout,
        )]);
        r.declared = 3;
        r.attempted = 0;
        assert!(!r.succeeded());
        assert!(r.cut_short());
        assert_eq!(r.fatal_error(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_render_marks_each_outcome() {
        let rendered = report(vec![
            CheckResult::passed(CheckId::new("a"), "a works", ""),
            CheckResult::failed(CheckId::new("b"), "b works", "got 2, wanted 3"),
            CheckResult::unknown(CheckId::new("c"), "c is gated", "skipped"),
        ])
        .render_plain();
        assert!(rendered.contains("pass   a works"));
        assert!(rendered.contains("FAIL   b works - got 2, wanted 3"));
        assert!(rendered.contains("skip   c is gated"));
        assert!(rendered.contains("1 of 2 checks passed (3 declared, 2 attempted)"));
    }

    #[test]
    fn test_serialized_entries_carry_the_structured_form() {
        let json = report(vec![CheckResult::unknown(
            CheckId::new("gated"),
            "gated check",
            "skipped",
        )])
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entry = &value["results"][0];
        assert!(entry["passed"].is_null());
        assert_eq!(entry["description"], "gated check");
        assert_eq!(entry["message"], "skipped");
        assert!(entry.get("error_kind").is_none());
    }
}
