use anyhow::Context;
use panel_core::Selector;
use panel_scheduler::Scheduler;

/// Look up one deployment, rendered as pretty JSON.
pub async fn get(scheduler: &dyn Scheduler, selector: &Selector) -> anyhow::Result<String> {
    let deployment = scheduler
        .get_deployment(selector)
        .await
        .with_context(|| format!("looking up {selector}"))?;
    Ok(serde_json::to_string_pretty(&deployment)?)
}

/// Every owned deployment, rendered as a pretty JSON array.
pub async fn list(scheduler: &dyn Scheduler) -> anyhow::Result<String> {
    let deployments = scheduler
        .list_deployments()
        .await
        .context("listing deployments")?;
    Ok(serde_json::to_string_pretty(&deployments)?)
}
