use super::{ContainerProber, ContainerStatus, ContainerSummary, ExecOutput, parse_port_list};
use crate::{Error, Result};
use serde::Deserialize;
use std::{path::PathBuf, process::Output, time::Duration};
use tokio::process::Command;

const LIST_TIMEOUT: Duration = Duration::from_secs(15);

/// Shells out to the `docker` command line client.
#[derive(Debug, Clone)]
pub struct CliProber {
    docker: PathBuf,
}

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    state: String,
    #[serde(default)]
    ports: String,
}

impl From<PsLine> for ContainerSummary {
    fn from(line: PsLine) -> Self {
        Self {
            id: line.id,
            name: line.names,
            state: line.state,
            ports: parse_port_list(&line.ports),
        }
    }
}

impl CliProber {
    pub fn new(docker: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        tracing::debug!(docker = %self.docker.display(), ?args, "running docker");

        let mut command = Command::new(&self.docker);
        command.args(args).kill_on_drop(true);

        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(Error::Probe(format!(
                "failed to run {}: {err}",
                self.docker.display()
            ))),
            Err(_) => Err(Error::Probe(format!(
                "docker {} timed out after {}s",
                args.first().unwrap_or(&""),
                timeout.as_secs_f32()
            ))),
        }
    }
}

pub(crate) fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerSummary>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<PsLine>(line)
                .map(ContainerSummary::from)
                .map_err(|err| Error::Probe(format!("unexpected docker ps output: {err}")))
        })
        .collect()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait::async_trait]
impl ContainerProber for CliProber {
    fn backend(&self) -> &'static str {
        "docker-cli"
    }

    async fn list(&self, filter: &str) -> Result<Vec<ContainerSummary>> {
        let filter = format!("name={filter}");
        let output = self
            .run(
                &["ps", "--all", "--no-trunc", "--filter", filter.as_str(), "--format", "{{json .}}"],
                LIST_TIMEOUT,
            )
            .await?;

        if !output.status.success() {
            return Err(Error::Probe(format!("docker ps failed: {}", stderr_of(&output))));
        }

        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        let output = self
            .run(
                &["inspect", "--type", "container", "--format", "{{.State.Status}}", name],
                LIST_TIMEOUT,
            )
            .await?;

        parse_inspect_status(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &stderr_of(&output),
        )
    }

    async fn exec(&self, name: &str, argv: &[&str], timeout: Duration) -> Result<ExecOutput> {
        let mut args = vec!["exec", name];
        args.extend_from_slice(argv);

        let output = self.run(&args, timeout).await?;

        Ok(ExecOutput {
            exit_code: output.status.code().map_or(-1, i64::from),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Maps `docker inspect --format {{.State.Status}}` output to a status
pub(crate) fn parse_inspect_status(success: bool, stdout: &str, stderr: &str) -> Result<ContainerStatus> {
    if success {
        Ok(ContainerStatus::from_state(stdout.trim()))
    } else if stderr.contains("No such") {
        Ok(ContainerStatus::Missing)
    } else {
        Err(Error::Probe(format!("docker inspect failed: {stderr}")))
    }
}
