//! Out-of-process inspection of the container hosting the hub.
//!
//! Two interchangeable backends implement [`ContainerProber`]: the Docker
//! Engine HTTP API and the `docker` command line client. [`select_backend`]
//! picks whichever is available at startup.

mod cli;
mod engine;

pub use cli::CliProber;
pub use engine::{EngineApiProber, demux_frames};

use crate::{Error, Result};
use std::{collections::BTreeMap, fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    Missing,
}

impl ContainerStatus {
    /// Maps an engine state string onto the three states checks care about
    pub fn from_state(state: &str) -> Self {
        if state.eq_ignore_ascii_case("running") {
            Self::Running
        } else {
            Self::Exited
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Missing => "missing",
        };
        f.write_str(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    /// Container port (`8765/tcp`) to host bindings (`0.0.0.0:8765`)
    pub ports: BTreeMap<String, Vec<String>>,
}

impl ContainerSummary {
    pub fn status(&self) -> ContainerStatus {
        ContainerStatus::from_state(&self.state)
    }

    pub fn is_port_bound(&self, port: &str) -> bool {
        self.ports.get(port).is_some_and(|bindings| !bindings.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait::async_trait]
pub trait ContainerProber: Send + Sync {
    /// Short name of the backend, for logs
    fn backend(&self) -> &'static str;

    /// Containers whose name matches `filter`
    async fn list(&self, filter: &str) -> Result<Vec<ContainerSummary>>;

    async fn status(&self, name: &str) -> Result<ContainerStatus>;

    /// Runs `argv` inside the container. A non-zero exit is not an error.
    async fn exec(&self, name: &str, argv: &[&str], timeout: Duration) -> Result<ExecOutput>;

    /// Runs a shell snippet inside the container
    async fn sh(&self, name: &str, script: &str, timeout: Duration) -> Result<ExecOutput> {
        self.exec(name, &["sh", "-c", script], timeout).await
    }
}

/// Picks the Engine API when `DOCKER_HOST` points at a reachable TCP
/// endpoint, otherwise the `docker` binary when it is on `PATH`.
pub async fn select_backend() -> Result<Box<dyn ContainerProber>> {
    if let Ok(host) = std::env::var("DOCKER_HOST") {
        if let Some(prober) = EngineApiProber::from_docker_host(&host) {
            match prober.ping().await {
                Ok(()) => {
                    tracing::info!(host, "using Docker Engine API backend");
                    return Ok(Box::new(prober));
                }
                Err(err) => {
                    tracing::warn!(host, %err, "Docker Engine API unavailable, trying CLI");
                }
            }
        }
    }

    match which::which("docker") {
        Ok(path) => {
            tracing::info!(path = %path.display(), "using docker CLI backend");
            Ok(Box::new(CliProber::new(path)))
        }
        Err(err) => Err(Error::Probe(format!(
            "no container backend available: DOCKER_HOST is not a reachable TCP endpoint and docker was not found ({err})"
        ))),
    }
}

/// Parses `docker ps` style port strings:
/// `0.0.0.0:5173->5173/tcp, :::8765->8765/tcp, 9000/tcp`
pub fn parse_port_list(ports: &str) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in ports.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once("->") {
            Some((host, container)) => {
                map.entry(container.trim().to_string())
                    .or_default()
                    .push(host.trim().to_string());
            }
            None => {
                map.entry(entry.to_string()).or_default();
            }
        }
    }

    map
}
