//! Sequential test harness with prerequisite skipping.
//!
//! Tests share a [`Session`]. A test that establishes something later tests
//! rely on records it as a prerequisite; dependents call
//! [`skip_if_prerequisite_failed`] first and are skipped, without touching
//! the network, when it is missing.

mod assertions;
pub mod context7;
mod report;
mod session;

pub use assertions::{
    assert_library_in_result, assert_mentions_any, check_critical_setup, run_agent_with_timer,
};
pub use report::generate_test_report;
pub use session::{Outcome, Prerequisite, Session, skip_if_prerequisite_failed};

use crate::checks::panic_message;
use futures::FutureExt;
use std::{fmt, panic::AssertUnwindSafe, process::ExitCode, time::Duration};

#[async_trait::async_trait]
pub trait HarnessTest: Send + Sync {
    fn name(&self) -> String;

    async fn run(&self, session: &mut Session) -> Outcome;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SuiteSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Skipped tests do not fail a suite
    pub fn exit_code(&self) -> ExitCode {
        if self.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    fn count(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}

pub struct Suite {
    tests: Vec<Box<dyn HarnessTest>>,
    timeout: Duration,
}

impl Suite {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tests: Vec::new(),
            timeout,
        }
    }

    pub fn add(&mut self, test: impl HarnessTest + 'static) -> &mut Self {
        self.tests.push(Box::new(test));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.tests.iter().map(|test| test.name()).collect()
    }

    /// Runs every test in order. Each outcome is recorded in `session`.
    pub async fn run(&self, session: &mut Session) -> SuiteSummary {
        let mut summary = SuiteSummary::default();

        for test in &self.tests {
            let name = test.name();
            tracing::info!(test = %name, "running test");

            let run = AssertUnwindSafe(test.run(session)).catch_unwind();
            let outcome = match tokio::time::timeout(self.timeout, run).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(panic)) => Outcome::Failed(format!("test panicked: {}", panic_message(&*panic))),
                Err(_) => Outcome::Failed(format!("timed out after {:?}", self.timeout)),
            };

            match &outcome {
                Outcome::Passed => tracing::info!(test = %name, "passed"),
                Outcome::Failed(reason) => tracing::error!(test = %name, %reason, "failed"),
                Outcome::Skipped(reason) => tracing::warn!(test = %name, %reason, "skipped"),
            }

            summary.count(&outcome);
            session.push_outcome(name, outcome);
        }

        tracing::info!(%summary, "suite finished");
        summary
    }
}

/// One line per test, `name: PASS|FAIL|SKIP` with the reason indented below
pub fn format_outcomes(session: &Session) -> String {
    let mut lines = Vec::new();
    for (name, outcome) in session.outcomes() {
        lines.push(format!("{name}: {}", outcome.label()));
        match outcome {
            Outcome::Failed(reason) | Outcome::Skipped(reason) => lines.push(format!("    {reason}")),
            Outcome::Passed => {}
        }
    }
    lines.join("\n")
}
