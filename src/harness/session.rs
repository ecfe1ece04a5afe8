use std::{collections::BTreeMap, fmt, time::Duration};

/// Result of a single harness test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "PASS",
            Self::Failed(_) => "FAIL",
            Self::Skipped(_) => "SKIP",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

impl From<crate::Result<()>> for Outcome {
    fn from(result: crate::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

/// What a successful prerequisite test left behind for later tests
#[derive(Debug, Clone, PartialEq)]
pub enum Prerequisite {
    Tools(Vec<String>),
    Flag,
    Elapsed(Duration),
}

/// State shared by the tests of one session.
///
/// A prerequisite is recorded once by the test that establishes it; tests
/// depending on it are skipped when it is absent.
#[derive(Debug, Default)]
pub struct Session {
    prerequisites: BTreeMap<String, Prerequisite>,
    outcomes: Vec<(String, Outcome)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name`. Returns `false` and keeps the first value when it was
    /// already recorded in this session.
    pub fn record(&mut self, name: impl Into<String>, value: Prerequisite) -> bool {
        let name = name.into();
        if self.prerequisites.contains_key(&name) {
            tracing::warn!(prerequisite = %name, "prerequisite already recorded");
            return false;
        }

        tracing::debug!(prerequisite = %name, ?value, "prerequisite recorded");
        self.prerequisites.insert(name, value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Prerequisite> {
        self.prerequisites.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.prerequisites.contains_key(name)
    }

    pub fn tools(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            Prerequisite::Tools(tools) => Some(tools),
            _ => None,
        }
    }

    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        match self.get(name)? {
            Prerequisite::Elapsed(elapsed) => Some(*elapsed),
            _ => None,
        }
    }

    pub(crate) fn push_outcome(&mut self, test: impl Into<String>, outcome: Outcome) {
        self.outcomes.push((test.into(), outcome));
    }

    /// Outcomes in the order the tests ran
    pub fn outcomes(&self) -> &[(String, Outcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, test: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == test)
            .map(|(_, outcome)| outcome)
    }
}

/// Returns a skip outcome when `prerequisite` was never recorded
pub fn skip_if_prerequisite_failed(session: &Session, prerequisite: &str) -> Option<Outcome> {
    if session.is_set(prerequisite) {
        None
    } else {
        Some(Outcome::Skipped(format!(
            "prerequisite '{prerequisite}' did not succeed"
        )))
    }
}
