//! In-memory runtime for tests.
//!
//! Behaves like a single Docker daemon: object names are unique, an image
//! must be resident before an object can be created from it, and objects
//! move from Created to Running when started. Failures can be injected per
//! operation and every call is journalled.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::RuntimeClient;
use crate::error::{RuntimeError, RuntimeResult};
use crate::object::{ObjectFilter, ObjectRef, ObjectSnapshot, ObjectSpec, ObjectState};

/// Runtime operations that can have failures injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchImage,
    Create,
    Start,
    Remove,
    List,
}

/// A journalled runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchImage(String),
    Create(String),
    Start(String),
    Remove { name: String, force: bool },
    List(ObjectFilter),
}

#[derive(Default)]
struct Inner {
    objects: Vec<ObjectSnapshot>,
    images: HashSet<String>,
    failures: HashMap<Operation, VecDeque<RuntimeError>>,
    journal: Vec<Call>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryRuntime {
    inner: Mutex<Inner>,
    advisory_filters: bool,
    yielding: bool,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore list filters entirely, returning every object.
    pub fn with_advisory_filters(mut self) -> Self {
        self.advisory_filters = true;
        self
    }

    /// Yield to the scheduler at the start of every call so concurrent
    /// callers interleave.
    pub fn with_yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Make the next call of `op` fail with `error`. Queued per operation.
    pub fn fail_next(&self, op: Operation, error: RuntimeError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Mark an image as already resident.
    pub fn add_image(&self, reference: &str) {
        self.lock().images.insert(reference.to_string());
    }

    /// Seed an object created by someone else (a stale deployment, another
    /// scheduler, or an unmanaged container). Its image becomes resident.
    pub fn insert_object(&self, snapshot: ObjectSnapshot) {
        let mut inner = self.lock();
        inner.images.insert(snapshot.image.clone());
        inner.objects.retain(|o| o.name != snapshot.name);
        inner.objects.push(snapshot);
    }

    /// Remove an object behind the scheduler's back.
    pub fn remove_externally(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.objects.len();
        inner.objects.retain(|o| o.name != name);
        inner.objects.len() != before
    }

    pub fn objects(&self) -> Vec<ObjectSnapshot> {
        self.lock().objects.clone()
    }

    pub fn object(&self, name: &str) -> Option<ObjectSnapshot> {
        self.lock().objects.iter().find(|o| o.name == name).cloned()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.lock().images.contains(reference)
    }

    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }
}

impl Inner {
    fn record(&mut self, op: Operation, call: Call) -> RuntimeResult<()> {
        self.journal.push(call);
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name == name)
    }
}

#[async_trait]
impl RuntimeClient for MemoryRuntime {
    async fn fetch_image(&self, reference: &str) -> RuntimeResult<()> {
        self.pause().await;
        let mut inner = self.lock();
        inner.record(Operation::FetchImage, Call::FetchImage(reference.to_string()))?;
        inner.images.insert(reference.to_string());
        Ok(())
    }

    async fn create_object(&self, spec: &ObjectSpec) -> RuntimeResult<ObjectRef> {
        self.pause().await;
        let mut inner = self.lock();
        inner.record(Operation::Create, Call::Create(spec.name.clone()))?;

        if inner.position(&spec.name).is_some() {
            return Err(RuntimeError::Conflict(format!(
                "the container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !inner.images.contains(&spec.image) {
            return Err(RuntimeError::NotFound(format!("no such image: {}", spec.image)));
        }

        inner.next_id += 1;
        let id = format!("{:012x}", inner.next_id);
        inner.objects.push(ObjectSnapshot {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            labels: spec.labels.clone(),
            mounts: spec
                .mounts
                .iter()
                .map(|m| m.destination().to_string())
                .collect(),
            state: ObjectState::Created,
        });

        Ok(ObjectRef {
            id,
            warnings: Vec::new(),
        })
    }

    async fn start_object(&self, name: &str) -> RuntimeResult<()> {
        self.pause().await;
        let mut inner = self.lock();
        inner.record(Operation::Start, Call::Start(name.to_string()))?;

        let idx = inner
            .position(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("no such container: {name}")))?;
        inner.objects[idx].state = ObjectState::Running;
        Ok(())
    }

    async fn remove_object(&self, name: &str, force: bool) -> RuntimeResult<()> {
        self.pause().await;
        let mut inner = self.lock();
        inner.record(
            Operation::Remove,
            Call::Remove {
                name: name.to_string(),
                force,
            },
        )?;

        let idx = inner
            .position(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("no such container: {name}")))?;
        if !force && inner.objects[idx].state == ObjectState::Running {
            return Err(RuntimeError::Conflict(format!(
                "cannot remove running container {name}"
            )));
        }
        inner.objects.remove(idx);
        Ok(())
    }

    async fn list_objects(
        &self,
        filter: &ObjectFilter,
        include_non_running: bool,
    ) -> RuntimeResult<Vec<ObjectSnapshot>> {
        self.pause().await;
        let mut inner = self.lock();
        inner.record(Operation::List, Call::List(filter.clone()))?;

        Ok(inner
            .objects
            .iter()
            .filter(|o| include_non_running || o.state == ObjectState::Running)
            .filter(|o| self.advisory_filters || filter.matches(o))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Mount, RestartPolicy};

    fn spec(name: &str, image: &str) -> ObjectSpec {
        ObjectSpec {
            name: name.to_string(),
            image: image.to_string(),
            labels: HashMap::from([("manager".to_string(), "s".to_string())]),
            env: HashMap::new(),
            restart_policy: RestartPolicy::Always,
            mounts: vec![Mount::tmpfs("/tmp", "rw")],
        }
    }

    #[tokio::test]
    async fn create_requires_resident_image() {
        let runtime = MemoryRuntime::new();
        let result = runtime.create_object(&spec("a", "nginx")).await;
        assert!(result.unwrap_err().is_not_found());

        runtime.fetch_image("nginx").await.unwrap();
        runtime.create_object(&spec("a", "nginx")).await.unwrap();
        assert_eq!(runtime.object("a").unwrap().state, ObjectState::Created);
        assert_eq!(runtime.object("a").unwrap().mounts, vec!["/tmp".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let runtime = MemoryRuntime::new();
        runtime.add_image("nginx");
        runtime.create_object(&spec("a", "nginx")).await.unwrap();

        let err = runtime.create_object(&spec("a", "nginx")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(runtime.objects().len(), 1);
    }

    #[tokio::test]
    async fn remove_running_needs_force() {
        let runtime = MemoryRuntime::new();
        runtime.add_image("nginx");
        runtime.create_object(&spec("a", "nginx")).await.unwrap();
        runtime.start_object("a").await.unwrap();

        assert!(runtime.remove_object("a", false).await.unwrap_err().is_conflict());
        runtime.remove_object("a", true).await.unwrap();
        assert!(runtime.remove_object("a", true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let runtime = MemoryRuntime::new();
        runtime.fail_next(Operation::FetchImage, RuntimeError::Other("registry down".into()));

        assert!(runtime.fetch_image("nginx").await.is_err());
        assert!(runtime.fetch_image("nginx").await.is_ok());
        assert_eq!(
            runtime.journal(),
            vec![
                Call::FetchImage("nginx".to_string()),
                Call::FetchImage("nginx".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn list_respects_running_flag_and_filters() {
        let runtime = MemoryRuntime::new();
        runtime.add_image("nginx");
        runtime.create_object(&spec("a", "nginx")).await.unwrap();
        runtime.create_object(&spec("b", "nginx")).await.unwrap();
        runtime.start_object("b").await.unwrap();

        let filter = ObjectFilter::label("manager", "s");
        assert_eq!(runtime.list_objects(&filter, false).await.unwrap().len(), 1);
        assert_eq!(runtime.list_objects(&filter, true).await.unwrap().len(), 2);

        let other = ObjectFilter::label("manager", "other");
        assert!(runtime.list_objects(&other, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advisory_filters_return_everything() {
        let runtime = MemoryRuntime::new().with_advisory_filters();
        runtime.add_image("nginx");
        runtime.create_object(&spec("a", "nginx")).await.unwrap();

        let other = ObjectFilter::label("manager", "other");
        assert_eq!(runtime.list_objects(&other, true).await.unwrap().len(), 1);
    }
}
