use super::{Check, HubContext};
use crate::Result;

/// `GET /api/stats` answers with the four hub counters
pub struct ApiFunctional;

#[async_trait::async_trait]
impl Check<HubContext> for ApiFunctional {
    fn name(&self) -> &str {
        "api_functional"
    }

    async fn run(&self, ctx: &HubContext) -> Result<()> {
        let stats = ctx.api.stats().await?;
        tracing::info!(
            total_servers = %stats.total_servers,
            active_servers = %stats.active_servers,
            total_workspaces = %stats.total_workspaces,
            active_workspaces = %stats.active_workspaces,
            "hub stats"
        );
        Ok(())
    }
}
