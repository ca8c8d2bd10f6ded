//! Runtime error types.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors reported by a container runtime.
///
/// `Conflict` and `NotFound` are distinct variants so callers can branch on
/// them without matching message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("runtime unreachable: {0}")]
    Connection(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RuntimeError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}
