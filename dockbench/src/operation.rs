use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::OperationError;
use crate::runtime::{ContainerRuntime, container_name};

/// One unit of work a worker repeats and times.
///
/// `target` is set in finite-input mode, where each call processes one pre-assigned
/// item, and is `None` otherwise. The worker measures latency around the whole
/// returned future, so everything the call does (including network round trips) is
/// part of the sample.
///
/// # Example
/// ```rust
/// use dockbench::{Operation, OperationError};
///
/// struct Noop;
///
/// impl Operation for Noop {
///     async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Operation: Send + Sync + 'static {
    fn invoke(
        &self,
        target: Option<&str>,
    ) -> impl Future<Output = Result<(), OperationError>> + Send;
}

/// List running containers, or all of them.
#[derive(Debug)]
pub struct ListContainers<R> {
    runtime: Arc<R>,
    all: bool,
}

impl<R: ContainerRuntime> ListContainers<R> {
    pub fn new(runtime: Arc<R>, all: bool) -> Self {
        Self { runtime, all }
    }
}

impl<R: ContainerRuntime> Operation for ListContainers<R> {
    async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
        self.runtime.list_containers(self.all).await?;
        Ok(())
    }
}

/// Inspect the given target, or a random container out of `ids` on every call.
#[derive(Debug)]
pub struct InspectContainer<R> {
    runtime: Arc<R>,
    ids: Vec<String>,
}

impl<R: ContainerRuntime> InspectContainer<R> {
    pub fn new(runtime: Arc<R>, ids: Vec<String>) -> Self {
        Self { runtime, ids }
    }

    fn pick(&self) -> Result<&str, OperationError> {
        if self.ids.is_empty() {
            return Err(OperationError::NoCandidates);
        }
        let idx = rand::thread_rng().gen_range(0..self.ids.len());
        Ok(&self.ids[idx])
    }
}

impl<R: ContainerRuntime> Operation for InspectContainer<R> {
    async fn invoke(&self, target: Option<&str>) -> Result<(), OperationError> {
        let id = match target {
            Some(id) => id,
            None => self.pick()?,
        };
        self.runtime.inspect_container(id).await?;
        Ok(())
    }
}

/// Create a fresh container and start it.
///
/// The created containers stay behind; callers clean up with
/// [`crate::runtime::remove_all_containers`] or a finite-input [`StopContainer`] run.
#[derive(Debug)]
pub struct StartContainer<R> {
    runtime: Arc<R>,
}

impl<R: ContainerRuntime> StartContainer<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: ContainerRuntime> Operation for StartContainer<R> {
    async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
        let id = self.runtime.create_container(&container_name()).await?;
        self.runtime.start_container(&id).await?;
        Ok(())
    }
}

/// Stop the target container and remove it. Needs a target.
#[derive(Debug)]
pub struct StopContainer<R> {
    runtime: Arc<R>,
    timeout: Duration,
}

impl<R: ContainerRuntime> StopContainer<R> {
    pub fn new(runtime: Arc<R>, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }
}

impl<R: ContainerRuntime> Operation for StopContainer<R> {
    async fn invoke(&self, target: Option<&str>) -> Result<(), OperationError> {
        let id = target.ok_or(OperationError::MissingTarget)?;
        self.runtime.stop_container(id, self.timeout).await?;
        self.runtime.remove_container(id).await?;
        Ok(())
    }
}
