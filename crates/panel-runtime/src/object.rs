//! Runtime object model shared by every `RuntimeClient` implementation.

use std::collections::HashMap;

/// Restart behaviour delegated to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    /// Name understood by the Docker Engine API.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    /// In-memory filesystem, e.g. `/tmp` with options `rw`.
    Tmpfs { destination: String, options: String },
}

impl Mount {
    pub fn tmpfs(destination: impl Into<String>, options: impl Into<String>) -> Self {
        Mount::Tmpfs {
            destination: destination.into(),
            options: options.into(),
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Mount::Tmpfs { destination, .. } => destination,
        }
    }
}

/// Everything needed to create a runtime object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub restart_policy: RestartPolicy,
    pub mounts: Vec<Mount>,
}

/// Handle returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Server-side filter for `list_objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectFilter {
    /// Objects carrying `key=value`.
    Label { key: String, value: String },
    /// The object with exactly this name.
    Name(String),
}

impl ObjectFilter {
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        ObjectFilter::Label {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether `snapshot` satisfies this filter exactly.
    pub fn matches(&self, snapshot: &ObjectSnapshot) -> bool {
        match self {
            ObjectFilter::Label { key, value } => snapshot.labels.get(key) == Some(value),
            ObjectFilter::Name(name) => snapshot.name == *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectState {
    Created,
    Running,
    Exited,
    Other(String),
}

impl ObjectState {
    pub fn parse(state: &str) -> Self {
        match state {
            "created" => ObjectState::Created,
            "running" => ObjectState::Running,
            "exited" => ObjectState::Exited,
            other => ObjectState::Other(other.to_string()),
        }
    }
}

/// A runtime object as observed by a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    /// Mount destinations.
    pub mounts: Vec<String>,
    pub state: ObjectState,
}
