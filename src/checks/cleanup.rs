use super::{Check, HubContext, reload::POLL_INTERVAL};
use crate::{
    Error, Result,
    sse::{SseReader, StopPolicy},
};
use tokio::time::Instant;

/// Closing a workspace stream terminates the stdio processes it spawned.
///
/// Every matching PID present after the cleanup window must already have
/// existed before the connection was opened.
pub struct ProcessCleanup;

#[async_trait::async_trait]
impl Check<HubContext> for ProcessCleanup {
    fn name(&self) -> &str {
        "process_cleanup"
    }

    async fn run(&self, ctx: &HubContext) -> Result<()> {
        let config = &ctx.config;

        let before = ctx.pids_named(&config.stdio_process).await?;
        tracing::info!(process = %config.stdio_process, count = before.len(), "initial process count");

        // A hub that spawns the process but holds back the response headers
        // still has to clean up once the request is dropped.
        match ctx
            .api
            .workspace_stream(&config.validation_workspace, config.cleanup_stream_timeout)
            .await
        {
            Ok(response) => {
                let policy = StopPolicy::after(1).within(config.cleanup_stream_timeout);
                match SseReader::from_response(response).collect(&policy).await {
                    Ok(summary) => tracing::debug!(stop = %summary.stop, "short-lived stream closed"),
                    Err(err) => tracing::debug!(%err, "short-lived stream ended with an error"),
                }
            }
            Err(err) if err.is_timeout() => {
                tracing::debug!(%err, "short-lived stream timed out before responding");
            }
            Err(err) => return Err(err),
        }

        let deadline = Instant::now() + config.cleanup_window;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let after = ctx.pids_named(&config.stdio_process).await?;
            let leaked: Vec<u32> = after.difference(&before).copied().collect();

            if leaked.is_empty() {
                tracing::info!(process = %config.stdio_process, count = after.len(), "final process count");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Assertion(format!(
                    "{} process(es) still running after {:?}: {leaked:?}",
                    config.stdio_process, config.cleanup_window
                )));
            }
        }
    }
}
