use super::{ContainerProber, ContainerStatus, ContainerSummary, ExecOutput};
use crate::{
    Error, Result,
    probe::{describe, preview},
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::{collections::BTreeMap, time::Duration};

const API_TIMEOUT: Duration = Duration::from_secs(15);

/// Talks to the Docker Engine HTTP API over TCP.
#[derive(Debug, Clone)]
pub struct EngineApiProber {
    client: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    state: String,
    #[serde(default)]
    ports: Vec<ApiPort>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiPort {
    #[serde(rename = "IP")]
    ip: Option<String>,
    private_port: u16,
    public_port: Option<u16>,
    #[serde(rename = "Type")]
    kind: String,
}

impl From<ApiContainer> for ContainerSummary {
    fn from(container: ApiContainer) -> Self {
        let mut ports: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for port in container.ports {
            let bindings = ports
                .entry(format!("{}/{}", port.private_port, port.kind))
                .or_default();
            if let Some(public) = port.public_port {
                let ip = port.ip.unwrap_or_else(|| "0.0.0.0".to_string());
                bindings.push(format!("{ip}:{public}"));
            }
        }

        let name = container
            .names
            .first()
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default();

        Self {
            id: container.id,
            name,
            state: container.state,
            ports,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectResponse {
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecInspect {
    exit_code: Option<i64>,
}

impl EngineApiProber {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds a prober from a `DOCKER_HOST` value. Only TCP endpoints are
    /// supported; unix sockets are left to the CLI backend.
    pub fn from_docker_host(host: &str) -> Option<Self> {
        if let Some(rest) = host.strip_prefix("tcp://") {
            Some(Self::new(format!("http://{rest}")))
        } else if host.starts_with("http://") || host.starts_with("https://") {
            Some(Self::new(host))
        } else {
            None
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let response = self.send(self.client.get(self.url("/_ping"))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Probe(format!(
                "engine ping returned {}",
                response.status()
            )))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|err| Error::Probe(format!("engine API at {}: {}", self.base, describe(&err))))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| Error::Probe(describe(&err)))?;

        if !status.is_success() {
            return Err(Error::Probe(format!(
                "engine API returned {status}: {}",
                preview(&text)
            )));
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn run_exec(&self, name: &str, argv: &[&str]) -> Result<ExecOutput> {
        let created = self
            .send(
                self.client
                    .post(self.url(&format!("/containers/{name}/exec")))
                    .json(&json!({
                        "AttachStdout": true,
                        "AttachStderr": true,
                        "Tty": false,
                        "Cmd": argv,
                    })),
            )
            .await?;

        if created.status() == StatusCode::NOT_FOUND {
            return Err(Error::Probe(format!("container '{name}' not found")));
        }
        let created: ExecCreated = Self::json(created).await?;

        let started = self
            .client
            .post(self.url(&format!("/exec/{}/start", created.id)))
            .json(&json!({ "Detach": false, "Tty": false }))
            .send()
            .await
            .map_err(|err| Error::Probe(describe(&err)))?;

        if !started.status().is_success() {
            return Err(Error::Probe(format!(
                "exec start returned {}",
                started.status()
            )));
        }

        let raw = started
            .bytes()
            .await
            .map_err(|err| Error::Probe(describe(&err)))?;
        let (stdout, stderr) = demux_frames(&raw);

        let inspected = self
            .send(
                self.client
                    .get(self.url(&format!("/exec/{}/json", created.id))),
            )
            .await?;
        let inspected: ExecInspect = Self::json(inspected).await?;

        Ok(ExecOutput {
            exit_code: inspected.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// Splits a multiplexed exec stream into stdout and stderr.
///
/// Every frame starts with an 8 byte header: stream type (1 = stdout,
/// 2 = stderr), three zero bytes and a big-endian payload length. Input that
/// does not start with a valid header is treated as raw TTY output.
pub fn demux_frames(raw: &[u8]) -> (String, String) {
    let looks_framed = raw.len() >= 8 && raw[0] <= 2 && raw[1..4] == [0, 0, 0];
    if !looks_framed {
        return (String::from_utf8_lossy(raw).into_owned(), String::new());
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut rest = raw;

    while rest.len() >= 8 {
        let kind = rest[0];
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = (8 + len).min(rest.len());
        let payload = &rest[8..end];

        match kind {
            2 => stderr.extend_from_slice(payload),
            _ => stdout.extend_from_slice(payload),
        }
        rest = &rest[end..];
    }

    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

#[async_trait::async_trait]
impl ContainerProber for EngineApiProber {
    fn backend(&self) -> &'static str {
        "engine-api"
    }

    async fn list(&self, filter: &str) -> Result<Vec<ContainerSummary>> {
        let filters = json!({ "name": [filter] }).to_string();
        let response = self
            .send(
                self.client
                    .get(self.url("/containers/json"))
                    .query(&[("all", "true"), ("filters", filters.as_str())]),
            )
            .await?;

        let containers: Vec<ApiContainer> = Self::json(response).await?;
        Ok(containers.into_iter().map(ContainerSummary::from).collect())
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/containers/{name}/json"))),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ContainerStatus::Missing);
        }

        let inspect: InspectResponse = Self::json(response).await?;
        Ok(ContainerStatus::from_state(&inspect.state.status))
    }

    async fn exec(&self, name: &str, argv: &[&str], timeout: Duration) -> Result<ExecOutput> {
        tracing::debug!(name, ?argv, "engine exec");

        tokio::time::timeout(timeout, self.run_exec(name, argv))
            .await
            .map_err(|_| {
                Error::Probe(format!(
                    "exec in '{name}' timed out after {}s",
                    timeout.as_secs_f32()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u8, payload: &str) -> Vec<u8> {
        let mut out = vec![kind, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload.as_bytes());
        out
    }

    #[test]
    fn demuxes_stdout_and_stderr() {
        let mut raw = frame(1, "hello ");
        raw.extend(frame(2, "warning\n"));
        raw.extend(frame(1, "world\n"));

        let (stdout, stderr) = demux_frames(&raw);
        assert_eq!(stdout, "hello world\n");
        assert_eq!(stderr, "warning\n");
    }

    #[test]
    fn truncated_frame_keeps_available_bytes() {
        let mut raw = frame(1, "complete");
        let mut partial = frame(1, "partial payload");
        partial.truncate(12);
        raw.extend(partial);

        let (stdout, _) = demux_frames(&raw);
        assert_eq!(stdout, "completepart");
    }

    #[test]
    fn unframed_output_is_raw_stdout() {
        let (stdout, stderr) = demux_frames(b"3\n");
        assert_eq!(stdout, "3\n");
        assert!(stderr.is_empty());
    }

    #[test]
    fn docker_host_parsing() {
        let prober = EngineApiProber::from_docker_host("tcp://127.0.0.1:2375").unwrap();
        assert_eq!(prober.url("/_ping"), "http://127.0.0.1:2375/_ping");

        assert!(EngineApiProber::from_docker_host("http://docker:2375/").is_some());
        assert!(EngineApiProber::from_docker_host("unix:///var/run/docker.sock").is_none());
    }

    #[test]
    fn api_container_maps_ports() {
        let container: ApiContainer = serde_json::from_value(json!({
            "Id": "4f1c2a",
            "Names": ["/yamcp-ui-dev"],
            "State": "running",
            "Ports": [
                {"IP": "0.0.0.0", "PrivatePort": 8765, "PublicPort": 8765, "Type": "tcp"},
                {"PrivatePort": 9229, "Type": "tcp"}
            ]
        }))
        .unwrap();
        let summary = ContainerSummary::from(container);

        assert_eq!(summary.name, "yamcp-ui-dev");
        assert_eq!(summary.status(), ContainerStatus::Running);
        assert!(summary.is_port_bound("8765/tcp"));
        assert!(!summary.is_port_bound("9229/tcp"));
    }

    #[tokio::test]
    async fn inspect_status_maps_not_found_to_missing() {
        use axum::{Json, Router, extract::Path, http::StatusCode as Code, response::IntoResponse, routing::get};

        let app = Router::new().route(
            "/containers/{name}/json",
            get(|Path(name): Path<String>| async move {
                if name == "yamcp-ui-dev" {
                    Json(json!({"Id": "4f1c2a", "State": {"Status": "exited", "Running": false}}))
                        .into_response()
                } else {
                    (Code::NOT_FOUND, Json(json!({"message": format!("No such container: {name}")})))
                        .into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let prober = EngineApiProber::new(format!("http://{addr}"));
        assert_eq!(prober.status("yamcp-ui-dev").await.unwrap(), ContainerStatus::Exited);
        assert_eq!(prober.status("gone").await.unwrap(), ContainerStatus::Missing);

        server.abort();
    }
}
