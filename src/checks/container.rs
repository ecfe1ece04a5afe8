use super::{Check, HubContext};
use crate::{Error, Result, container::ContainerStatus};

/// The container is running and every required port is published
pub struct ContainerHealth;

#[async_trait::async_trait]
impl Check<HubContext> for ContainerHealth {
    fn name(&self) -> &str {
        "container_health"
    }

    async fn run(&self, ctx: &HubContext) -> Result<()> {
        match ctx.prober.status(&ctx.container).await? {
            ContainerStatus::Running => {}
            ContainerStatus::Missing => {
                return Err(Error::Assertion(format!(
                    "container {} does not exist",
                    ctx.container
                )));
            }
            status => {
                return Err(Error::Assertion(format!(
                    "container status is {status}, expected running"
                )));
            }
        }

        let container = ctx.container_summary().await?;
        for port in &ctx.config.required_ports {
            if !container.is_port_bound(port) {
                return Err(Error::Assertion(format!("port {port} is not mapped to the host")));
            }
            tracing::debug!(port, bindings = ?container.ports[port], "port mapped");
        }

        Ok(())
    }
}
