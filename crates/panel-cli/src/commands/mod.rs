pub mod demo;
pub mod query;
pub mod schedule;

use std::path::Path;

use anyhow::Context;
use panel_core::PanelConfig;
use panel_scheduler::ContainerScheduler;
use tracing::{debug, info};

/// Config file read from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "panel.toml";

/// Command-line flags that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub scheduler_name: Option<String>,
    pub endpoint: Option<String>,
}

/// Resolve configuration: file, then environment, then flags.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<PanelConfig> {
    load_config_with(path, overrides, PanelConfig::with_env_overrides)
}

fn load_config_with(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
    apply_env: impl FnOnce(PanelConfig) -> PanelConfig,
) -> anyhow::Result<PanelConfig> {
    let config = match path {
        Some(path) => PanelConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            PanelConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("loading {DEFAULT_CONFIG_FILE}"))?
        }
        None => {
            debug!("no config file, using defaults");
            PanelConfig::default()
        }
    };

    let mut config = apply_env(config);
    if let Some(name) = &overrides.scheduler_name {
        config.scheduler.name = name.clone();
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.runtime.endpoint = Some(endpoint.clone());
    }

    // Surface a bad endpoint or timeout before any connection attempt.
    config.endpoint()?;
    config.timeout()?;
    Ok(config)
}

pub async fn connect(config: &PanelConfig) -> anyhow::Result<ContainerScheduler> {
    let endpoint = config.endpoint()?;
    let scheduler = ContainerScheduler::connect(config)
        .await
        .with_context(|| format!("connecting to {endpoint}"))?;
    info!(scheduler = scheduler.name(), %endpoint, "connected to runtime");
    Ok(scheduler)
}
