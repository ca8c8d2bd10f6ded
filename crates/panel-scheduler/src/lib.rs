//! panel-scheduler: reconciles deployments against a container runtime.
//!
//! Maps `Deployment` values (from `panel-core`) onto runtime objects
//! (through `panel-runtime`). The scheduler:
//!
//! - Creates, replaces, and starts one runtime object per selector
//! - Resolves a name conflict by force-removing the old object and
//!   recreating it once
//! - Discovers the objects it owns through ownership labels, never through
//!   private bookkeeping
//!
//! # Architecture
//!
//! ```text
//! Scheduler (trait)
//!   ├── ContainerScheduler
//!   │   ├── Arc<dyn RuntimeClient> (injected)
//!   │   └── scheduler name (identifier prefix + manager label)
//!   └── SerialScheduler<S>
//!       └── per-selector Mutex, wrapping any Scheduler
//! ```
//!
//! `ContainerScheduler` holds no lock. Concurrent `schedule` calls for the
//! same selector race inside create → conflict → remove → create; wrap it in
//! `SerialScheduler` when callers need per-selector exclusivity.

pub mod error;
pub mod scheduler;
pub mod serial;

use async_trait::async_trait;
use panel_core::{Deployment, Selector};

pub use error::{Phase, SchedulerError, SchedulerResult};
pub use scheduler::ContainerScheduler;
pub use serial::SerialScheduler;

/// The four deployment operations exposed to callers.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Bring the deployment to a running state, replacing whatever object
    /// currently holds its identifier.
    async fn schedule(&self, deployment: &Deployment) -> SchedulerResult<()>;

    /// Force-remove the deployment's object. An object holding the
    /// identifier without this scheduler's `manager` label is left alone
    /// and reported as not found.
    async fn unschedule(&self, selector: &Selector) -> SchedulerResult<()>;

    async fn get_deployment(&self, selector: &Selector) -> SchedulerResult<Deployment>;

    /// Every deployment owned by this scheduler, in runtime order.
    async fn list_deployments(&self) -> SchedulerResult<Vec<Deployment>>;
}
