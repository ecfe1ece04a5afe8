use crate::{
    Config, Error, Result,
    container::{ContainerProber, ContainerSummary},
    hub::HubApi,
};
use std::{collections::BTreeSet, fmt};

/// Everything the hub checks share
pub struct HubContext {
    pub config: Config,
    pub api: HubApi,
    pub prober: Box<dyn ContainerProber>,
    /// Resolved container name, set by [`HubContext::find_container`]
    pub container: String,
}

/// A process as seen from inside the container: PID and start time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub started: String,
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} started {}", self.pid, self.started)
    }
}

impl HubContext {
    pub fn new(config: Config, prober: Box<dyn ContainerProber>) -> Self {
        let api = HubApi::new(config.backend_url.clone(), config.request_timeout);
        let container = config.container_name.clone();

        Self {
            config,
            api,
            prober,
            container,
        }
    }

    /// Finds the configured container by name filter and remembers its name
    pub async fn find_container(&mut self) -> Result<ContainerSummary> {
        let found = self.prober.list(&self.config.container_name).await?;
        let container = pick_container(found, &self.config.container_name).ok_or_else(|| {
            Error::Assertion(format!(
                "Container {} not found",
                self.config.container_name
            ))
        })?;

        self.container = container.name.clone();
        Ok(container)
    }

    /// Current summary of the resolved container
    pub async fn container_summary(&self) -> Result<ContainerSummary> {
        let found = self.prober.list(&self.container).await?;
        pick_container(found, &self.container)
            .ok_or_else(|| Error::Assertion(format!("Container {} disappeared", self.container)))
    }

    pub async fn sh(&self, script: &str) -> Result<crate::container::ExecOutput> {
        self.prober
            .sh(&self.container, script, self.config.exec_timeout)
            .await
    }

    /// Identities of processes whose command line matches `pattern`
    pub async fn processes_matching(&self, pattern: &str) -> Result<BTreeSet<ProcessIdentity>> {
        let script = format!(
            "for pid in $(pgrep -f '{}'); do ps -o pid=,lstart= -p \"$pid\"; done",
            self_excluding(pattern)
        );
        let output = self.sh(&script).await?;
        Ok(parse_identities(&output.stdout))
    }

    /// PIDs of processes named exactly `name`
    pub async fn pids_named(&self, name: &str) -> Result<BTreeSet<u32>> {
        let output = self.sh(&format!("pgrep -x '{name}' || true")).await?;
        Ok(parse_pids(&output.stdout))
    }
}

/// Prefers an exact name match over other containers matched by the filter
fn pick_container(found: Vec<ContainerSummary>, name: &str) -> Option<ContainerSummary> {
    let exact = found.iter().position(|container| container.name == name);
    match exact {
        Some(idx) => found.into_iter().nth(idx),
        None => found.into_iter().next(),
    }
}

/// `pgrep -f` matches the shell running it unless the pattern cannot match
/// itself: `backend` becomes `[b]ackend`.
fn self_excluding(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => format!("[{first}]{}", chars.as_str()),
        _ => pattern.to_string(),
    }
}

/// Parses `ps -o pid=,lstart=` lines such as `  42 Mon Jan  6 10:00:00 2025`
pub(crate) fn parse_identities(stdout: &str) -> BTreeSet<ProcessIdentity> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, started) = line.split_once(char::is_whitespace)?;
            Some(ProcessIdentity {
                pid: pid.parse().ok()?,
                started: started.split_whitespace().collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}

pub(crate) fn parse_pids(stdout: &str) -> BTreeSet<u32> {
    stdout
        .split_whitespace()
        .filter_map(|pid| pid.parse().ok())
        .collect()
}
