use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::scheduler::SchedulerEngine;

/// What every long-running daemon component gets handed at spawn time.
#[derive(Clone)]
pub struct ModuleCtx {
    pub engine: SchedulerEngine,
    pub shutdown: tokio::sync::watch::Receiver<bool>,
}

/// A background component of the daemon, stopped through `ctx.shutdown`.
pub trait Module: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, ctx: ModuleCtx) -> JoinHandle<anyhow::Result<()>>;
}

/// Spawn every module, then wait for all of them to finish.
///
/// A module that errors or panics is logged; the others keep running
/// until shutdown.
pub async fn run_all(modules: Vec<Box<dyn Module>>, ctx: ModuleCtx) {
    let handles: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)> = modules
        .into_iter()
        .map(|m| {
            let name = m.name();
            info!(module = name, "starting");
            (name, m.spawn(ctx.clone()))
        })
        .collect();

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => info!(module = name, "stopped"),
            Ok(Err(e)) => error!(module = name, error = %e, "module failed"),
            Err(e) => error!(module = name, error = %e, "module panicked"),
        }
    }
}
