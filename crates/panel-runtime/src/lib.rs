//! panel-runtime: the container runtime capability consumed by the scheduler.
//!
//! Defines the `RuntimeClient` trait and the object model it speaks, plus
//! two implementations:
//!
//! - **`DockerRuntime`**: Docker Engine HTTP API over a Unix socket or TCP
//! - **`MemoryRuntime`**: in-process fake with fault injection
//!   (`test-utils` feature)
//!
//! # Architecture
//!
//! ```text
//! RuntimeClient (trait, Arc<dyn RuntimeClient>)
//!   ├── DockerRuntime
//!   │   ├── Transport (hyper http1, one connection per request)
//!   │   └── negotiated API version (/v1.xx prefix)
//!   └── MemoryRuntime
//!       └── Mutex<objects, resident images, injected failures, journal>
//! ```

pub mod docker;
pub mod error;
pub mod object;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;

pub use docker::DockerRuntime;
pub use error::{RuntimeError, RuntimeResult};
pub use object::{
    Mount, ObjectFilter, ObjectRef, ObjectSnapshot, ObjectSpec, ObjectState, RestartPolicy,
};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{Call, MemoryRuntime, Operation};

/// Operations the scheduler needs from a container runtime.
///
/// Implementations must report a name collision on create as
/// `RuntimeError::Conflict` and a missing object on remove as
/// `RuntimeError::NotFound`.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Fetch an image and wait until the transfer has completely finished.
    async fn fetch_image(&self, reference: &str) -> RuntimeResult<()>;

    /// Create (but do not start) an object.
    async fn create_object(&self, spec: &ObjectSpec) -> RuntimeResult<ObjectRef>;

    async fn start_object(&self, name: &str) -> RuntimeResult<()>;

    /// Remove an object; `force` removes it regardless of its run state.
    async fn remove_object(&self, name: &str, force: bool) -> RuntimeResult<()>;

    /// List objects matching `filter`. Filters are advisory: some runtimes
    /// return a superset, so callers re-check what they rely on.
    async fn list_objects(
        &self,
        filter: &ObjectFilter,
        include_non_running: bool,
    ) -> RuntimeResult<Vec<ObjectSnapshot>>;
}
