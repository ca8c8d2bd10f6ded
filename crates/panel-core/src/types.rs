//! Shared types used across controlpanel crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a workload slot within a scheduler: a `(module, name)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selector {
    pub name: String,
    pub module: String,
}

impl Selector {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.module, self.name)
    }
}

/// A desired or observed container workload.
///
/// Passed into the scheduler as an intent, or rebuilt from runtime state as a
/// snapshot. Snapshots only carry what the runtime persists: the selector,
/// the image, and the mount destinations. Everything else comes back empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(flatten)]
    pub selector: Selector,
    /// Image reference, e.g. `nginx` or `ghcr.io/org/app:1.2`.
    #[serde(default)]
    pub image: String,
    /// Mount destinations inside the container.
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub clusterable: bool,
    #[serde(default)]
    pub expose_externally: bool,
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl Deployment {
    /// A deployment of `image` under the given selector, everything else defaulted.
    pub fn new(selector: Selector, image: impl Into<String>) -> Self {
        Self {
            selector,
            image: image.into(),
            ..Self::default()
        }
    }

    /// Parse a deployment from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
