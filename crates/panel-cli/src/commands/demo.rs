//! `panel demo`: schedule one nginx deployment and list what the scheduler
//! sees afterwards.

use panel_core::{Deployment, Selector};
use panel_scheduler::Scheduler;
use tracing::info;

use super::{query, schedule};

pub fn demo_deployment() -> Deployment {
    Deployment::new(Selector::new("testName", "testModule"), "nginx")
}

/// Returns the listing as pretty JSON.
pub async fn run(scheduler: &dyn Scheduler) -> anyhow::Result<String> {
    let deployment = demo_deployment();
    schedule::schedule(scheduler, &deployment).await?;
    info!(selector = %deployment.selector, "demo deployment scheduled");
    query::list(scheduler).await
}
