//! Ordered, isolated validation checks.
//!
//! A [`CheckRunner`] executes every registered [`Check`] in declaration order.
//! An error or a panic in one check is recorded as that check's failure and
//! never prevents the next one from running.

mod api;
mod cleanup;
mod container;
mod context;
mod reload;
mod streaming;

pub use api::ApiFunctional;
pub use cleanup::ProcessCleanup;
pub use container::ContainerHealth;
pub use context::{HubContext, ProcessIdentity};
pub use reload::HotReloading;
pub use streaming::SseStreaming;

use crate::{
    Error, Result,
    report::{CheckResult, ValidationReport},
};
use futures::FutureExt;
use std::{any::Any, panic::AssertUnwindSafe, time::Instant};

#[async_trait::async_trait]
pub trait Check<C: Sync + ?Sized>: Send + Sync {
    /// Unique name, used as the report key
    fn name(&self) -> &str;

    async fn run(&self, ctx: &C) -> Result<()>;
}

pub struct CheckRunner<C: Sync + ?Sized> {
    checks: Vec<Box<dyn Check<C>>>,
}

impl<C: Sync + ?Sized> Default for CheckRunner<C> {
    fn default() -> Self {
        Self { checks: Vec::new() }
    }
}

impl<C: Sync + ?Sized> CheckRunner<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: impl Check<C> + 'static) -> Result<()> {
        if self.checks.iter().any(|existing| existing.name() == check.name()) {
            return Err(Error::DuplicateCheck(check.name().to_string()));
        }

        self.checks.push(Box::new(check));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|check| check.name())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub async fn run(&self, ctx: &C) -> ValidationReport {
        let mut results = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            let name = check.name();
            tracing::info!(check = name, "running check");
            let start = Instant::now();

            let outcome = AssertUnwindSafe(check.run(ctx)).catch_unwind().await;
            let elapsed = start.elapsed();

            let result = match outcome {
                Ok(Ok(())) => {
                    tracing::info!(check = name, ?elapsed, "check passed");
                    CheckResult::pass(name)
                }
                Ok(Err(err)) => {
                    tracing::error!(check = name, ?elapsed, %err, "check failed");
                    CheckResult::fail(name, err.to_string())
                }
                Err(panic) => {
                    let detail = format!("check panicked: {}", panic_message(&*panic));
                    tracing::error!(check = name, ?elapsed, %detail, "check crashed");
                    CheckResult::fail(name, detail)
                }
            };

            results.push(result);
        }

        ValidationReport::new(results)
    }

    /// Records every check as failed without running any of them
    pub fn fail_all(&self, detail: &str) -> ValidationReport {
        tracing::error!(%detail, "skipping all checks");
        ValidationReport::new(
            self.names()
                .map(|name| CheckResult::fail(name, detail))
                .collect(),
        )
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The five hub checks in the order they run
pub fn hub_runner() -> Result<CheckRunner<HubContext>> {
    let mut runner = CheckRunner::new();
    runner.register(ContainerHealth)?;
    runner.register(ApiFunctional)?;
    runner.register(SseStreaming)?;
    runner.register(HotReloading)?;
    runner.register(ProcessCleanup)?;
    Ok(runner)
}

/// Locates the container, then runs every hub check against it.
///
/// When the container cannot be found every check is reported as failed.
pub async fn run_validation(mut ctx: HubContext) -> Result<ValidationReport> {
    let runner = hub_runner()?;

    tracing::info!("starting MCP hub infrastructure validation");
    match ctx.find_container().await {
        Ok(container) => {
            tracing::info!(name = %container.name, id = %container.id, "found container");
            Ok(runner.run(&ctx).await)
        }
        Err(err) => Ok(runner.fail_all(&err.to_string())),
    }
}
