use std::path::Path;

use anyhow::{Context, bail};
use panel_core::{Deployment, Selector};
use panel_scheduler::Scheduler;

/// Parse a `KEY=VALUE` pair for `--env`.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

pub fn deployment_from_file(path: &Path) -> anyhow::Result<Deployment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let deployment = Deployment::from_toml_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    validate(&deployment.selector)?;
    Ok(deployment)
}

pub fn deployment_from_args(
    name: String,
    module: String,
    image: String,
    env: Vec<(String, String)>,
) -> anyhow::Result<Deployment> {
    let mut deployment = Deployment::new(Selector::new(name, module), image);
    deployment.env.extend(env);
    validate(&deployment.selector)?;
    Ok(deployment)
}

fn validate(selector: &Selector) -> anyhow::Result<()> {
    if selector.name.is_empty() || selector.module.is_empty() {
        bail!("deployment needs a non-empty name and module, got `{selector}`");
    }
    Ok(())
}

pub async fn schedule(scheduler: &dyn Scheduler, deployment: &Deployment) -> anyhow::Result<()> {
    scheduler
        .schedule(deployment)
        .await
        .with_context(|| format!("scheduling {}", deployment.selector))?;
    println!("✓ Scheduled {} ({})", deployment.selector, deployment.image);
    Ok(())
}

pub async fn unschedule(scheduler: &dyn Scheduler, selector: &Selector) -> anyhow::Result<()> {
    scheduler
        .unschedule(selector)
        .await
        .with_context(|| format!("unscheduling {selector}"))?;
    println!("✓ Unscheduled {selector}");
    Ok(())
}
