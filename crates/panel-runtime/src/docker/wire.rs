//! Docker Engine API request and response bodies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::object::{Mount, ObjectSnapshot, ObjectSpec, ObjectState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct VersionResponse {
    pub api_version: String,
    #[serde(rename = "MinAPIVersion", default)]
    pub min_api_version: Option<String>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateContainerRequest<'a> {
    pub image: &'a str,
    pub labels: &'a HashMap<String, String>,
    pub env: Vec<String>,
    pub host_config: HostConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct HostConfig<'a> {
    pub restart_policy: RestartPolicyBody,
    pub tmpfs: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RestartPolicyBody {
    pub name: &'static str,
}

impl<'a> CreateContainerRequest<'a> {
    pub(crate) fn from_spec(spec: &'a ObjectSpec) -> Self {
        let mut env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        env.sort();

        let tmpfs = spec
            .mounts
            .iter()
            .map(|mount| match mount {
                Mount::Tmpfs {
                    destination,
                    options,
                } => (destination.as_str(), options.as_str()),
            })
            .collect();

        Self {
            image: &spec.image,
            labels: &spec.labels,
            env,
            host_config: HostConfig {
                restart_policy: RestartPolicyBody {
                    name: spec.restart_policy.as_str(),
                },
                tmpfs,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateContainerResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub mounts: Option<Vec<MountPoint>>,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct MountPoint {
    #[serde(default)]
    pub destination: String,
}

impl From<ContainerSummary> for ObjectSnapshot {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary
            .names
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();

        ObjectSnapshot {
            id: summary.id,
            name,
            image: summary.image,
            labels: summary.labels.unwrap_or_default(),
            mounts: summary
                .mounts
                .unwrap_or_default()
                .into_iter()
                .map(|m| m.destination)
                .collect(),
            state: ObjectState::parse(&summary.state),
        }
    }
}

/// One line of the image pull progress stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PullProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl PullProgress {
    /// The failure carried by this message, if any.
    pub(crate) fn failure(&self) -> Option<String> {
        self.error.clone().or_else(|| {
            self.error_detail
                .as_ref()
                .and_then(|detail| detail.message.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::RestartPolicy;

    #[test]
    fn create_request_shape() {
        let spec = ObjectSpec {
            name: "s-m-web".to_string(),
            image: "nginx".to_string(),
            labels: HashMap::from([("manager".to_string(), "s".to_string())]),
            env: HashMap::from([
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
            ]),
            restart_policy: RestartPolicy::Always,
            mounts: vec![Mount::tmpfs("/tmp", "rw")],
        };

        let json = serde_json::to_value(CreateContainerRequest::from_spec(&spec)).unwrap();
        assert_eq!(json["Image"], "nginx");
        assert_eq!(json["Labels"]["manager"], "s");
        assert_eq!(json["Env"], serde_json::json!(["A=1", "B=2"]));
        assert_eq!(json["HostConfig"]["RestartPolicy"]["Name"], "always");
        assert_eq!(json["HostConfig"]["Tmpfs"]["/tmp"], "rw");
    }

    #[test]
    fn container_summary_to_snapshot() {
        let raw = r#"{
            "Id": "8dfafdbc3a40",
            "Names": ["/testScheduler-testModule-testName"],
            "Image": "nginx",
            "Labels": {"manager": "testScheduler", "module": "testModule", "name": "testName"},
            "Mounts": [{"Type": "tmpfs", "Destination": "/tmp"}],
            "State": "running"
        }"#;
        let summary: ContainerSummary = serde_json::from_str(raw).unwrap();
        let snapshot = ObjectSnapshot::from(summary);

        assert_eq!(snapshot.name, "testScheduler-testModule-testName");
        assert_eq!(snapshot.image, "nginx");
        assert_eq!(snapshot.labels["module"], "testModule");
        assert_eq!(snapshot.mounts, vec!["/tmp".to_string()]);
        assert_eq!(snapshot.state, ObjectState::Running);
    }

    #[test]
    fn container_summary_tolerates_nulls() {
        let raw = r#"{
            "Id": "abc", "Names": null, "Labels": null, "Mounts": null, "State": "created"
        }"#;
        let summary: ContainerSummary = serde_json::from_str(raw).unwrap();
        let snapshot = ObjectSnapshot::from(summary);

        assert!(snapshot.name.is_empty());
        assert!(snapshot.labels.is_empty());
        assert!(snapshot.mounts.is_empty());
        assert_eq!(snapshot.state, ObjectState::Created);
    }

    #[test]
    fn pull_progress_failure() {
        let ok: PullProgress =
            serde_json::from_str(r#"{"status":"Downloading","progressDetail":{}}"#).unwrap();
        assert_eq!(ok.failure(), None);

        let failed: PullProgress = serde_json::from_str(
            r#"{"errorDetail":{"message":"manifest unknown"},"error":"manifest unknown"}"#,
        )
        .unwrap();
        assert_eq!(failed.failure().as_deref(), Some("manifest unknown"));
    }
}
