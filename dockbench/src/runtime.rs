//! The container runtime the benchmarks drive.
//!
//! [`ContainerRuntime`] is the boundary with the backend client. The engine never
//! calls it directly; the operations in [`crate::operation`] do, and the helpers here
//! prepare and clean up backend state around a benchmark.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::RuntimeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub running: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
}

/// Client of a container runtime.
///
/// Every call blocks the calling worker until the backend answers, so a benchmark
/// measures the full round trip.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// List running containers, or every container when `all` is set.
    fn list_containers(
        &self,
        all: bool,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, RuntimeError>> + Send;

    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerDetails, RuntimeError>> + Send;

    /// Create a stopped container and return its id.
    fn create_container(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<String, RuntimeError>> + Send;

    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Stop a container, killing it if it has not exited after `timeout`.
    fn stop_container(
        &self,
        id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    fn remove_container(&self, id: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;
}

/// Unique name for a container created by a benchmark.
pub fn container_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let salt: u32 = rand::thread_rng().gen();
    format!("benchmark_container_{nanos}{salt}")
}

/// Create `n` stopped containers, failing on the first error.
pub async fn create_containers<R: ContainerRuntime>(
    runtime: &R,
    n: usize,
) -> Result<Vec<String>, RuntimeError> {
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        ids.push(runtime.create_container(&container_name()).await?);
    }
    Ok(ids)
}

/// Containers that exist but never ran.
pub async fn create_dead_containers<R: ContainerRuntime>(
    runtime: &R,
    n: usize,
) -> Result<Vec<String>, RuntimeError> {
    create_containers(runtime, n).await
}

/// Containers that are created and started.
pub async fn create_alive_containers<R: ContainerRuntime>(
    runtime: &R,
    n: usize,
) -> Result<Vec<String>, RuntimeError> {
    let ids = create_containers(runtime, n).await?;
    for id in &ids {
        runtime.start_container(id).await?;
    }
    Ok(ids)
}

/// Ids of every container, running or not.
pub async fn container_ids<R: ContainerRuntime>(runtime: &R) -> Result<Vec<String>, RuntimeError> {
    Ok(runtime
        .list_containers(true)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

pub async fn container_count<R: ContainerRuntime>(
    runtime: &R,
    all: bool,
) -> Result<usize, RuntimeError> {
    Ok(runtime.list_containers(all).await?.len())
}

/// Stop and remove every container. Returns how many were removed.
pub async fn remove_all_containers<R: ContainerRuntime>(
    runtime: &R,
    stop_timeout: Duration,
) -> Result<usize, RuntimeError> {
    let containers = runtime.list_containers(true).await?;
    for container in &containers {
        if container.running {
            runtime.stop_container(&container.id, stop_timeout).await?;
        }
        runtime.remove_container(&container.id).await?;
    }
    Ok(containers.len())
}

#[derive(Clone, Debug)]
struct SimulatedContainer {
    name: String,
    running: bool,
}

/// In-memory runtime answering every call after a fixed latency.
///
/// Stands in for a real daemon in the driver and in tests. State changes follow the
/// daemon's rules: starting a running container or removing one that still runs is a
/// conflict, and unknown ids are not found.
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    latency: Duration,
    image: String,
    containers: Mutex<BTreeMap<String, SimulatedContainer>>,
}

impl SimulatedRuntime {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            image: "ubuntu".to_string(),
            containers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn with_containers<T>(&self, f: impl FnOnce(&mut BTreeMap<String, SimulatedContainer>) -> T) -> T {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut containers)
    }

    fn set_running(&self, id: &str, running: bool) -> Result<(), RuntimeError> {
        self.with_containers(|containers| {
            let container = containers
                .get_mut(id)
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
            if running && container.running {
                return Err(RuntimeError::Conflict {
                    id: id.to_string(),
                    reason: "already running".to_string(),
                });
            }
            container.running = running;
            Ok(())
        })
    }
}

impl ContainerRuntime for SimulatedRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.round_trip().await;
        Ok(self.with_containers(|containers| {
            containers
                .iter()
                .filter(|(_, c)| all || c.running)
                .map(|(id, c)| ContainerSummary {
                    id: id.clone(),
                    name: c.name.clone(),
                    running: c.running,
                })
                .collect()
        }))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        self.round_trip().await;
        self.with_containers(|containers| {
            containers
                .get(id)
                .map(|c| ContainerDetails {
                    id: id.to_string(),
                    name: c.name.clone(),
                    image: self.image.clone(),
                    running: c.running,
                })
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
        })
    }

    async fn create_container(&self, name: &str) -> Result<String, RuntimeError> {
        self.round_trip().await;
        let id = format!("{:016x}", rand::thread_rng().gen::<u64>());
        self.with_containers(|containers| {
            if containers.values().any(|c| c.name == name) {
                return Err(RuntimeError::Conflict {
                    id: name.to_string(),
                    reason: "name already in use".to_string(),
                });
            }
            containers.insert(
                id.clone(),
                SimulatedContainer {
                    name: name.to_string(),
                    running: false,
                },
            );
            Ok(id)
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.round_trip().await;
        self.set_running(id, true)
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.round_trip().await;
        self.set_running(id, false)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.round_trip().await;
        self.with_containers(|containers| match containers.get(id) {
            None => Err(RuntimeError::NotFound(id.to_string())),
            Some(c) if c.running => Err(RuntimeError::Conflict {
                id: id.to_string(),
                reason: "container is running".to_string(),
            }),
            Some(_) => {
                containers.remove(id);
                Ok(())
            }
        })
    }
}
