//! `ContainerScheduler`, which reconciles deployments against runtime objects.
//!
//! Every deployment maps to exactly one runtime object named
//! `<scheduler>-<module>-<name>` and carrying the ownership labels. The
//! runtime is the only record of what is deployed; nothing is cached here
//! between calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use panel_core::identity::{MANAGER_LABEL, MODULE_LABEL, NAME_LABEL};
use panel_core::{Deployment, PanelConfig, Selector, identifier, labels};
use panel_runtime::{
    DockerRuntime, Mount, ObjectFilter, ObjectSnapshot, ObjectSpec, RestartPolicy, RuntimeClient,
    RuntimeError,
};

use crate::Scheduler;
use crate::error::{Phase, SchedulerError, SchedulerResult};

/// Writable scratch space mounted into every object.
const TMP_MOUNT: &str = "/tmp";

/// The reconciling scheduler.
pub struct ContainerScheduler {
    runtime: Arc<dyn RuntimeClient>,
    /// Prefix of every identifier and value of the `manager` label.
    name: String,
}

impl ContainerScheduler {
    /// Create a scheduler over an already connected runtime.
    pub fn new(runtime: Arc<dyn RuntimeClient>, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
        }
    }

    /// Connect to the Docker daemon described by `config`.
    pub async fn connect(config: &PanelConfig) -> SchedulerResult<Self> {
        let runtime = DockerRuntime::from_config(config)
            .await
            .map_err(SchedulerError::Connection)?;
        Ok(Self::new(Arc::new(runtime), config.scheduler.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime object name for `selector`.
    pub fn identifier(&self, selector: &Selector) -> String {
        identifier(&self.name, selector)
    }

    fn object_spec(&self, deployment: &Deployment) -> ObjectSpec {
        ObjectSpec {
            name: self.identifier(&deployment.selector),
            image: deployment.image.clone(),
            labels: labels(&self.name, &deployment.selector),
            env: deployment.env.clone(),
            restart_policy: RestartPolicy::Always,
            mounts: vec![Mount::tmpfs(TMP_MOUNT, "rw")],
        }
    }

    /// Whether `snapshot` carries this scheduler's `manager` label.
    fn owns(&self, snapshot: &ObjectSnapshot) -> bool {
        snapshot.labels.get(MANAGER_LABEL) == Some(&self.name)
    }

    /// Create the object, replacing a conflicting one exactly once.
    ///
    /// The image fetched before the first attempt is assumed resident for
    /// the retry, so it is not fetched again.
    async fn create(&self, spec: &ObjectSpec) -> SchedulerResult<()> {
        let err = match self.runtime.create_object(spec).await {
            Ok(object) => {
                debug!(identifier = %spec.name, id = %object.id, "object created");
                return Ok(());
            }
            Err(err) => err,
        };

        if !err.is_conflict() {
            return Err(SchedulerError::runtime(Phase::Create, &spec.name, err));
        }

        warn!(identifier = %spec.name, "identifier already in use, replacing existing object");
        match self.runtime.remove_object(&spec.name, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(identifier = %spec.name, "conflicting object already gone");
            }
            Err(e) => return Err(SchedulerError::runtime(Phase::Delete, &spec.name, e)),
        }

        let object = self
            .runtime
            .create_object(spec)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::Create, &spec.name, e))?;
        debug!(identifier = %spec.name, id = %object.id, "object recreated");
        Ok(())
    }
}

/// Rebuild a deployment from what the runtime persisted.
fn to_deployment(snapshot: ObjectSnapshot) -> Deployment {
    let label = |key: &str| snapshot.labels.get(key).cloned().unwrap_or_default();
    Deployment {
        selector: Selector::new(label(NAME_LABEL), label(MODULE_LABEL)),
        image: snapshot.image,
        volumes: snapshot.mounts,
        ..Deployment::default()
    }
}

#[async_trait]
impl Scheduler for ContainerScheduler {
    async fn schedule(&self, deployment: &Deployment) -> SchedulerResult<()> {
        let spec = self.object_spec(deployment);

        if !deployment.image.is_empty() {
            self.runtime
                .fetch_image(&deployment.image)
                .await
                .map_err(|e| SchedulerError::runtime(Phase::ImageFetch, &spec.name, e))?;
        }

        self.create(&spec).await?;

        // A failed start leaves the object created; the next schedule call
        // replaces it through the conflict path.
        self.runtime
            .start_object(&spec.name)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::Start, &spec.name, e))?;

        info!(
            identifier = %spec.name,
            selector = %deployment.selector,
            image = %deployment.image,
            "deployment scheduled"
        );
        Ok(())
    }

    async fn unschedule(&self, selector: &Selector) -> SchedulerResult<()> {
        let identifier = self.identifier(selector);
        let objects = self
            .runtime
            .list_objects(&ObjectFilter::Name(identifier.clone()), true)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::List, &identifier, e))?;

        match objects.iter().find(|o| o.name == identifier) {
            None => {
                return Err(SchedulerError::runtime(
                    Phase::Delete,
                    &identifier,
                    RuntimeError::NotFound(format!("no such object: {identifier}")),
                ));
            }
            Some(object) if !self.owns(object) => {
                warn!(%identifier, "refusing to remove an object this scheduler does not own");
                return Err(SchedulerError::DeploymentNotFound(identifier));
            }
            Some(_) => {}
        }

        self.runtime
            .remove_object(&identifier, true)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::Delete, &identifier, e))?;

        info!(%identifier, %selector, "deployment unscheduled");
        Ok(())
    }

    async fn get_deployment(&self, selector: &Selector) -> SchedulerResult<Deployment> {
        let identifier = self.identifier(selector);
        let objects = self
            .runtime
            .list_objects(&ObjectFilter::Name(identifier.clone()), true)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::List, &identifier, e))?;

        objects
            .into_iter()
            .find(|o| o.name == identifier && self.owns(o))
            .map(to_deployment)
            .ok_or(SchedulerError::DeploymentNotFound(identifier))
    }

    async fn list_deployments(&self) -> SchedulerResult<Vec<Deployment>> {
        let filter = ObjectFilter::label(MANAGER_LABEL, self.name.as_str());
        let objects = self
            .runtime
            .list_objects(&filter, true)
            .await
            .map_err(|e| SchedulerError::runtime(Phase::List, &self.name, e))?;

        // Label filters are advisory on some runtimes; re-check ownership.
        let deployments: Vec<Deployment> = objects
            .into_iter()
            .filter(|o| {
                let owned = self.owns(o);
                if !owned {
                    warn!(name = %o.name, "runtime returned an object this scheduler does not own");
                }
                owned
            })
            .map(to_deployment)
            .collect();

        debug!(scheduler = %self.name, count = deployments.len(), "deployments listed");
        Ok(deployments)
    }
}
