use super::{Check, HubContext, ProcessIdentity};
use crate::{Error, Result};
use std::{collections::BTreeSet, time::Duration};
use tokio::time::Instant;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Touching the providers file restarts the backend process.
///
/// The backend counts as restarted once no process matching the backend
/// pattern has the PID and start time recorded before the change.
pub struct HotReloading;

fn describe(ids: &BTreeSet<ProcessIdentity>) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[async_trait::async_trait]
impl Check<HubContext> for HotReloading {
    fn name(&self) -> &str {
        "hot_reloading"
    }

    async fn run(&self, ctx: &HubContext) -> Result<()> {
        let config = &ctx.config;

        let before = ctx.processes_matching(&config.backend_process).await?;
        if before.is_empty() {
            return Err(Error::Assertion(format!(
                "backend process '{}' not found",
                config.backend_process
            )));
        }
        tracing::info!(before = %describe(&before), "backend process before reload");

        let touch = ctx
            .sh(&format!(
                "echo \"hot_reload_test\" >> '{}'",
                config.providers_file
            ))
            .await?;
        if !touch.success() {
            return Err(Error::Assertion(format!(
                "could not modify {}: {}",
                config.providers_file,
                touch.stderr.trim()
            )));
        }

        tracing::info!(window = ?config.reload_window, "waiting for the backend to restart");
        let deadline = Instant::now() + config.reload_window;
        let mut after;

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            after = ctx.processes_matching(&config.backend_process).await?;

            if !after.is_empty() && after.is_disjoint(&before) {
                tracing::info!(after = %describe(&after), "backend process restarted");
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        if after.is_empty() {
            Err(Error::Assertion(
                "backend process not found after reload".to_string(),
            ))
        } else {
            Err(Error::Assertion(format!(
                "backend did not restart within {:?}: {}",
                config.reload_window,
                describe(&after)
            )))
        }
    }
}
