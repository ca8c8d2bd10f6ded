//! Scheduler error types.

use std::fmt;

use panel_runtime::RuntimeError;
use thiserror::Error;

/// The step of a scheduler operation that talked to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ImageFetch,
    Create,
    Start,
    Delete,
    List,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::ImageFetch => "image fetch",
            Phase::Create => "create",
            Phase::Start => "start",
            Phase::Delete => "delete",
            Phase::List => "list",
        })
    }
}

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to connect to runtime: {0}")]
    Connection(#[source] RuntimeError),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("{phase} failed for {identifier}: {source}")]
    Runtime {
        phase: Phase,
        identifier: String,
        #[source]
        source: RuntimeError,
    },
}

impl SchedulerError {
    pub(crate) fn runtime(phase: Phase, identifier: &str, source: RuntimeError) -> Self {
        SchedulerError::Runtime {
            phase,
            identifier: identifier.to_string(),
            source,
        }
    }

    /// True for a missing deployment, whether reported by a lookup or by the
    /// runtime during a delete.
    pub fn is_not_found(&self) -> bool {
        match self {
            SchedulerError::DeploymentNotFound(_) => true,
            SchedulerError::Runtime { source, .. } => source.is_not_found(),
            SchedulerError::Connection(_) => false,
        }
    }

    /// The phase that failed, for runtime errors.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SchedulerError::Runtime { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
