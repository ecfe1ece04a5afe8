use super::{Check, HubContext};
use crate::{
    Error, Result,
    hub::{ServerConfig, WorkspaceConfig},
    probe::content_type,
    sse::{SseReader, StopPolicy},
};
use reqwest::StatusCode;

/// The workspace stream carries the validation server's output
pub struct SseStreaming;

/// Registers the echo server and its workspace. A rejected registration is
/// logged and tolerated since the hub may already know both.
pub(crate) async fn register_validation_workspace(ctx: &HubContext) -> Result<()> {
    let config = &ctx.config;
    let server = ServerConfig::stdio(
        &config.validation_server,
        &config.stdio_process,
        [config.validation_marker.as_str()],
    );
    let workspace = WorkspaceConfig::new(&config.validation_workspace, [&config.validation_server]);

    let response = ctx.api.add_server(&server).await?;
    if !response.is_success() {
        tracing::warn!(status = %response.status, body = %response.body.as_text(), "server registration rejected");
    }

    let response = ctx.api.add_workspace(&workspace).await?;
    if !response.is_success() {
        tracing::warn!(status = %response.status, body = %response.body.as_text(), "workspace registration rejected");
    }

    Ok(())
}

#[async_trait::async_trait]
impl Check<HubContext> for SseStreaming {
    fn name(&self) -> &str {
        "sse_streaming"
    }

    async fn run(&self, ctx: &HubContext) -> Result<()> {
        let config = &ctx.config;
        register_validation_workspace(ctx).await?;

        let url = config.workspace_stream_url(&config.validation_workspace);
        tracing::info!(url, "connecting to event stream");
        let response = ctx
            .api
            .workspace_stream(&config.validation_workspace, config.stream_timeout)
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::Assertion(format!(
                "stream endpoint returned status {}",
                response.status()
            )));
        }

        let content_type = content_type(&response).unwrap_or_default();
        if !content_type.contains("text/event-stream") {
            return Err(Error::Protocol(format!(
                "wrong content type: '{content_type}'"
            )));
        }

        let policy = StopPolicy::after(config.max_events)
            .until_match(&config.validation_marker)
            .within(config.stream_timeout);
        let summary = SseReader::from_response(response).collect(&policy).await?;

        if summary.matched {
            tracing::info!(events = summary.events.len(), "marker found in stream");
            Ok(())
        } else {
            Err(Error::Assertion(format!(
                "'{}' not found in {} events ({})",
                config.validation_marker,
                summary.events.len(),
                summary.stop
            )))
        }
    }
}
