use std::{fmt::Write as _, process::ExitCode};

const RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Why the check failed. Always set for failures.
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = if detail.trim().is_empty() {
            "check failed without a reason".to_string()
        } else {
            detail
        };

        Self {
            name: name.into(),
            passed: false,
            detail: Some(detail),
        }
    }
}

/// Results of one validation run, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub results: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self { results }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|result| result.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|result| result.name == name)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// `api_functional` -> `Api Functional`
pub fn display_name(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Renders the human-readable summary printed at the end of `validate`
pub fn format_report(report: &ValidationReport) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "VALIDATION RESULTS");
    let _ = writeln!(out, "{heavy}");

    for result in &report.results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "{}: {status}", display_name(&result.name));
        if let Some(detail) = result.detail.as_deref().filter(|_| !result.passed) {
            let _ = writeln!(out, "    {detail}");
        }
    }

    let _ = writeln!(out, "{light}");
    let _ = writeln!(
        out,
        "Total: {} passed, {} failed",
        report.passed(),
        report.failed()
    );

    if report.is_success() {
        let _ = write!(out, "ALL VALIDATIONS PASSED!");
    } else {
        let _ = write!(out, "SOME VALIDATIONS FAILED!");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_title_cased() {
        assert_eq!(display_name("container_health"), "Container Health");
        assert_eq!(display_name("api_functional"), "Api Functional");
        assert_eq!(display_name("SSE_streaming"), "Sse Streaming");
    }

    #[test]
    fn counts_add_up() {
        let report = ValidationReport::new(vec![
            CheckResult::pass("container_health"),
            CheckResult::fail("api_functional", "boom"),
            CheckResult::pass("sse_streaming"),
        ]);

        assert_eq!(report.total(), 3);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.passed() + report.failed(), report.total());
        assert_eq!(report.exit_code(), ExitCode::FAILURE);
    }

    #[test]
    fn empty_detail_is_replaced() {
        let result = CheckResult::fail("x", "  ");
        assert!(!result.detail.unwrap().trim().is_empty());
    }

    #[test]
    fn empty_report_succeeds() {
        let report = ValidationReport::default();
        assert!(report.is_success());
        assert_eq!(report.exit_code(), ExitCode::SUCCESS);
    }

    #[test]
    fn format_mixed_report() {
        let report = ValidationReport::new(vec![
            CheckResult::pass("container_health"),
            CheckResult::fail(
                "api_functional",
                "protocol error: GET http://localhost:8765/api/stats returned unexpected status 500 Internal Server Error",
            ),
            CheckResult::pass("sse_streaming"),
            CheckResult::pass("hot_reloading"),
            CheckResult::pass("process_cleanup"),
        ]);

        insta::assert_snapshot!(format_report(&report), @r"
        ==================================================
        VALIDATION RESULTS
        ==================================================
        Container Health: PASS
        Api Functional: FAIL
            protocol error: GET http://localhost:8765/api/stats returned unexpected status 500 Internal Server Error
        Sse Streaming: PASS
        Hot Reloading: PASS
        Process Cleanup: PASS
        --------------------------------------------------
        Total: 4 passed, 1 failed
        SOME VALIDATIONS FAILED!
        ");
    }

    #[test]
    fn format_all_passed() {
        let report = ValidationReport::new(vec![
            CheckResult::pass("container_health"),
            CheckResult::pass("api_functional"),
        ]);

        insta::assert_snapshot!(format_report(&report), @r"
        ==================================================
        VALIDATION RESULTS
        ==================================================
        Container Health: PASS
        Api Functional: PASS
        --------------------------------------------------
        Total: 2 passed, 0 failed
        ALL VALIDATIONS PASSED!
        ");
    }

    #[test]
    fn formatting_is_deterministic() {
        let report = ValidationReport::new(vec![CheckResult::fail("a", "b")]);
        assert_eq!(format_report(&report), format_report(&report));
    }
}
