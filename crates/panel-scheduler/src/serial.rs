//! Per-selector serialization on top of any `Scheduler`.
//!
//! `schedule`, `unschedule` and `get_deployment` for the same selector run
//! one at a time; different selectors still run concurrently. Listing takes
//! no lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use panel_core::{Deployment, Selector};

use crate::Scheduler;
use crate::error::SchedulerResult;

type LockMap = HashMap<Selector, Arc<Mutex<()>>>;

pub struct SerialScheduler<S> {
    inner: S,
    locks: StdMutex<LockMap>,
}

/// Holds one selector's lock. Dropping it, including when the owning
/// future is cancelled, prunes lock entries nobody holds or awaits.
struct SelectorGuard<'a> {
    locks: &'a StdMutex<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SelectorGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        prune(&mut lock_map(self.locks));
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop entries referenced only by the map itself.
fn prune(locks: &mut LockMap) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}

impl<S: Scheduler> SerialScheduler<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of selectors with a live lock entry.
    pub fn tracked_selectors(&self) -> usize {
        lock_map(&self.locks).len()
    }

    async fn acquire(&self, selector: &Selector) -> SelectorGuard<'_> {
        let lock = {
            let mut locks = lock_map(&self.locks);
            prune(&mut locks);
            locks.entry(selector.clone()).or_default().clone()
        };
        let mut held = SelectorGuard {
            locks: &self.locks,
            guard: None,
        };
        trace!(%selector, "waiting for selector lock");
        held.guard = Some(lock.lock_owned().await);
        held
    }
}

#[async_trait]
impl<S: Scheduler> Scheduler for SerialScheduler<S> {
    async fn schedule(&self, deployment: &Deployment) -> SchedulerResult<()> {
        let _guard = self.acquire(&deployment.selector).await;
        self.inner.schedule(deployment).await
    }

    async fn unschedule(&self, selector: &Selector) -> SchedulerResult<()> {
        let _guard = self.acquire(selector).await;
        self.inner.unschedule(selector).await
    }

    async fn get_deployment(&self, selector: &Selector) -> SchedulerResult<Deployment> {
        let _guard = self.acquire(selector).await;
        self.inner.get_deployment(selector).await
    }

    async fn list_deployments(&self) -> SchedulerResult<Vec<Deployment>> {
        self.inner.list_deployments().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{Context, Waker};

    use crate::ContainerScheduler;
    use panel_runtime::MemoryRuntime;

    #[tokio::test]
    async fn lock_entries_are_pruned() {
        let runtime = Arc::new(MemoryRuntime::new());
        let scheduler = SerialScheduler::new(ContainerScheduler::new(runtime, "s"));

        let deployment = Deployment::new(Selector::new("api", "billing"), "nginx");
        scheduler.schedule(&deployment).await.unwrap();
        scheduler.unschedule(&deployment.selector).await.unwrap();

        assert_eq!(scheduler.tracked_selectors(), 0);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let runtime = Arc::new(MemoryRuntime::new());
        let scheduler = SerialScheduler::new(ContainerScheduler::new(runtime, "s"));

        let err = scheduler
            .get_deployment(&Selector::new("api", "billing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(scheduler.tracked_selectors(), 0);
    }

    #[tokio::test]
    async fn cancelled_call_releases_its_entry() {
        let runtime = Arc::new(MemoryRuntime::new().with_yielding());
        let scheduler = SerialScheduler::new(ContainerScheduler::new(runtime, "s"));
        let deployment = Deployment::new(Selector::new("api", "billing"), "nginx");

        // One poll takes the lock and suspends inside the image fetch.
        let mut call = Box::pin(scheduler.schedule(&deployment));
        let mut cx = Context::from_waker(Waker::noop());
        assert!(call.as_mut().poll(&mut cx).is_pending());
        assert_eq!(scheduler.tracked_selectors(), 1);

        drop(call);
        assert_eq!(scheduler.tracked_selectors(), 0);

        scheduler.schedule(&deployment).await.unwrap();
        assert_eq!(scheduler.tracked_selectors(), 0);
    }
}
