//! Typed wrapper over the hub's HTTP API.

use crate::{
    Error, Result,
    probe::{HttpProbe, ProbeResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Request body for `POST /api/servers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ServerConfig {
    /// A server the hub launches as a child process speaking over stdio
    pub fn stdio<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: "stdio".to_string(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Request body for `POST /api/workspaces`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub name: String,
    pub servers: Vec<String>,
}

impl WorkspaceConfig {
    pub fn new<I, S>(name: impl Into<String>, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Hub counters. Each key must be present; its value is reported as sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_servers: Value,
    pub active_servers: Value,
    pub total_workspaces: Value,
    pub active_workspaces: Value,
}

#[derive(Debug, Clone)]
pub struct HubApi {
    probe: HttpProbe,
    base_url: String,
    timeout: Duration,
}

impl HubApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe: HttpProbe::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn probe(&self) -> &HttpProbe {
        &self.probe
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn add_server(&self, server: &ServerConfig) -> Result<ProbeResponse> {
        tracing::info!(server = %server.name, command = %server.command, "registering server");
        let body = serde_json::to_value(server)?;
        self.probe
            .post_json(&self.url("/api/servers"), &body, self.timeout)
            .await
    }

    pub async fn add_workspace(&self, workspace: &WorkspaceConfig) -> Result<ProbeResponse> {
        tracing::info!(workspace = %workspace.name, servers = ?workspace.servers, "registering workspace");
        let body = serde_json::to_value(workspace)?;
        self.probe
            .post_json(&self.url("/api/workspaces"), &body, self.timeout)
            .await
    }

    /// `GET /api/stats`. Every counter must be present.
    pub async fn stats(&self) -> Result<HubStats> {
        let url = self.url("/api/stats");
        let value = self.probe.get_json(&url, self.timeout).await?;

        serde_json::from_value(value)
            .map_err(|err| Error::Protocol(format!("GET {url} returned incomplete stats: {err}")))
    }

    /// Opens the event stream of `workspace`
    pub async fn workspace_stream(
        &self,
        workspace: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        self.probe
            .open_stream(&self.url(&format!("/mcp/{workspace}")), timeout)
            .await
    }
}
