//! panel.toml configuration parser.
//!
//! ```toml
//! [scheduler]
//! name = "testScheduler"
//!
//! [runtime]
//! endpoint = "unix:///var/run/docker.sock"
//! api_version = "1.43"
//! timeout = "30s"
//! ```
//!
//! Environment overrides follow the Docker client conventions
//! (`DOCKER_HOST`, `DOCKER_API_VERSION`) plus `PANEL_SCHEDULER_NAME`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SCHEDULER_NAME: &str = "controlpanel";
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TCP_PORT: u16 = 2375;

pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";
pub const ENV_DOCKER_API_VERSION: &str = "DOCKER_API_VERSION";
pub const ENV_SCHEDULER_NAME: &str = "PANEL_SCHEDULER_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid runtime endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name stamped into every identifier and `manager` label.
    #[serde(default = "default_scheduler_name")]
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler_name(),
        }
    }
}

fn default_scheduler_name() -> String {
    DEFAULT_SCHEDULER_NAME.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `unix:///path`, `tcp://host:port` or `http://host:port`.
    pub endpoint: Option<String>,
    /// Pins the API version and skips negotiation.
    pub api_version: Option<String>,
    /// Per-request timeout, e.g. "30s" or "500ms".
    pub timeout: Option<String>,
}

/// Where the container runtime listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEndpoint {
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl fmt::Display for RuntimeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            RuntimeEndpoint::Tcp(authority) => write!(f, "tcp://{authority}"),
        }
    }
}

impl std::str::FromStr for RuntimeEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidEndpoint(s.to_string()));
            }
            return Ok(RuntimeEndpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(RuntimeEndpoint::Unix(PathBuf::from(s)));
        }

        let rest = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("http://"))
            .ok_or_else(|| ConfigError::InvalidEndpoint(s.to_string()))?;
        let authority = rest.trim_end_matches('/');
        if authority.is_empty() || authority.contains('/') {
            return Err(ConfigError::InvalidEndpoint(s.to_string()));
        }

        match authority.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                port.parse::<u16>()
                    .map_err(|_| ConfigError::InvalidEndpoint(s.to_string()))?;
                Ok(RuntimeEndpoint::Tcp(authority.to_string()))
            }
            Some(_) => Err(ConfigError::InvalidEndpoint(s.to_string())),
            None => Ok(RuntimeEndpoint::Tcp(format!("{authority}:{DEFAULT_TCP_PORT}"))),
        }
    }
}

impl PanelConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup(ENV_DOCKER_HOST).filter(|v| !v.is_empty()) {
            self.runtime.endpoint = Some(host);
        }
        if let Some(version) = lookup(ENV_DOCKER_API_VERSION).filter(|v| !v.is_empty()) {
            self.runtime.api_version = Some(version);
        }
        if let Some(name) = lookup(ENV_SCHEDULER_NAME).filter(|v| !v.is_empty()) {
            self.scheduler.name = name;
        }
        self
    }

    /// Resolved runtime endpoint, falling back to the local Docker socket.
    pub fn endpoint(&self) -> Result<RuntimeEndpoint, ConfigError> {
        self.runtime
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .parse()
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match self.runtime.timeout.as_deref() {
            Some(raw) => {
                parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration(raw.to_string()))
            }
            None => Ok(DEFAULT_TIMEOUT),
        }
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_parse_minimal() {
        let config = PanelConfig::from_toml_str("").unwrap();
        assert_eq!(config.scheduler.name, DEFAULT_SCHEDULER_NAME);
        assert_eq!(
            config.endpoint().unwrap(),
            RuntimeEndpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(config.timeout().unwrap(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[scheduler]
name = "testScheduler"

[runtime]
endpoint = "tcp://10.0.0.5:2376"
api_version = "1.41"
timeout = "500ms"
"#;
        let config = PanelConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.scheduler.name, "testScheduler");
        assert_eq!(
            config.endpoint().unwrap(),
            RuntimeEndpoint::Tcp("10.0.0.5:2376".to_string())
        );
        assert_eq!(config.runtime.api_version.as_deref(), Some("1.41"));
        assert_eq!(config.timeout().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nname = \"from-file\"").unwrap();

        let config = PanelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.name, "from-file");
    }

    #[test]
    fn test_from_missing_file() {
        let result = PanelConfig::from_file(Path::new("/nonexistent/panel.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn env_overrides_win() {
        let env = HashMap::from([
            (ENV_DOCKER_HOST, "tcp://docker:2375"),
            (ENV_DOCKER_API_VERSION, "1.40"),
            (ENV_SCHEDULER_NAME, "env-name"),
        ]);
        let config = PanelConfig::from_toml_str("[scheduler]\nname = \"file-name\"")
            .unwrap()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.scheduler.name, "env-name");
        assert_eq!(config.runtime.endpoint.as_deref(), Some("tcp://docker:2375"));
        assert_eq!(config.runtime.api_version.as_deref(), Some("1.40"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = PanelConfig::default().with_overrides_from(|_| Some(String::new()));
        assert_eq!(config.scheduler.name, DEFAULT_SCHEDULER_NAME);
        assert!(config.runtime.endpoint.is_none());
    }

    #[test]
    fn endpoint_schemes() {
        assert_eq!(
            "unix:///run/docker.sock".parse::<RuntimeEndpoint>().unwrap(),
            RuntimeEndpoint::Unix(PathBuf::from("/run/docker.sock"))
        );
        assert_eq!(
            "/run/docker.sock".parse::<RuntimeEndpoint>().unwrap(),
            RuntimeEndpoint::Unix(PathBuf::from("/run/docker.sock"))
        );
        assert_eq!(
            "http://localhost:2375/".parse::<RuntimeEndpoint>().unwrap(),
            RuntimeEndpoint::Tcp("localhost:2375".to_string())
        );
        assert_eq!(
            "tcp://docker".parse::<RuntimeEndpoint>().unwrap(),
            RuntimeEndpoint::Tcp("docker:2375".to_string())
        );
    }

    #[test]
    fn endpoint_rejects_garbage() {
        for raw in [
            "npipe:////./pipe/docker",
            "tcp://",
            "tcp://host:notaport",
            "unix://",
            "tcp://:2375",
        ] {
            assert!(
                matches!(raw.parse::<RuntimeEndpoint>(), Err(ConfigError::InvalidEndpoint(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn endpoint_display_round_trips() {
        let endpoint = RuntimeEndpoint::Tcp("docker:2375".to_string());
        assert_eq!(endpoint.to_string().parse::<RuntimeEndpoint>().unwrap(), endpoint);
    }

    #[test]
    fn invalid_timeout_is_an_error() {
        let mut config = PanelConfig::default();
        config.runtime.timeout = Some("soon".to_string());
        assert!(matches!(config.timeout(), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("307445734561825861m"), None);
    }

    #[test]
    fn test_overflowing_timeout_is_invalid() {
        let config =
            PanelConfig::from_toml_str("[runtime]\ntimeout = \"307445734561825861m\"\n").unwrap();
        assert!(matches!(config.timeout(), Err(ConfigError::InvalidDuration(_))));
    }
}
