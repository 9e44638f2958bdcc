use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{ContainerInfo, ContainerRuntime, ContainerSpec};
use crate::FleetError;

#[derive(Debug, Clone)]
struct MemoryContainer {
    info: ContainerInfo,
    spec: Option<ContainerSpec>,
}

/// Container engine kept entirely in memory.
///
/// Backs dry runs against locally started simulators (give it a loopback
/// prefix) and lets tests seed orphaned containers, strip labels or make
/// teardown fail.
#[derive(Debug)]
pub struct InMemoryRuntime {
    ip_prefix: String,
    reachable: AtomicBool,
    fail_teardown: AtomicBool,
    created: AtomicUsize,
    next_host: AtomicUsize,
    containers: Mutex<BTreeMap<String, MemoryContainer>>,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new("172.18.0.")
    }
}

impl InMemoryRuntime {
    /// Containers get `<ip_prefix><n>` addresses starting at `n = 2`.
    pub fn new(ip_prefix: impl Into<String>) -> Self {
        Self {
            ip_prefix: ip_prefix.into(),
            reachable: AtomicBool::new(true),
            fail_teardown: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            next_host: AtomicUsize::new(2),
            containers: Mutex::new(BTreeMap::new()),
        }
    }

    fn containers(&self) -> MutexGuard<'_, BTreeMap<String, MemoryContainer>> {
        self.containers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes every stop and remove fail while still forgetting the container
    /// on remove, like an engine that errors after acting.
    pub fn set_fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `create` calls so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers().keys().cloned().collect()
    }

    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.containers().get(name).and_then(|container| container.spec.clone())
    }

    /// Adds a running container that this process did not create.
    pub fn seed(&self, name: &str, labels: &[(&str, &str)]) {
        let info = ContainerInfo {
            id: format!("seeded-{}", name),
            name: name.to_string(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            running: true,
            ip_address: Some(self.allocate_ip()),
        };
        self.containers().insert(name.to_string(), MemoryContainer { info, spec: None });
    }

    pub fn strip_label(&self, name: &str, key: &str) -> bool {
        self.containers()
            .get_mut(name)
            .map(|container| container.info.labels.remove(key).is_some())
            .unwrap_or(false)
    }

    fn allocate_ip(&self) -> String {
        format!("{}{}", self.ip_prefix, self.next_host.fetch_add(1, Ordering::SeqCst))
    }

    fn check_reachable(&self) -> Result<(), FleetError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FleetError::RuntimeUnreachable("in-memory runtime offline".to_string()))
        }
    }

    fn not_found(name: &str) -> FleetError {
        FleetError::ContainerNotFound(name.to_string())
    }
}

impl ContainerRuntime for InMemoryRuntime {
    async fn ping(&self) -> Result<(), FleetError> {
        self.check_reachable()
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, FleetError> {
        self.check_reachable()?;
        let mut containers = self.containers();
        if containers.contains_key(&spec.name) {
            return Err(FleetError::Runtime(format!("container name {} already in use", spec.name)));
        }
        let id = format!("mem-{:04}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        let info = ContainerInfo {
            id: id.clone(),
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            running: false,
            ip_address: None,
        };
        containers.insert(spec.name.clone(), MemoryContainer { info, spec: Some(spec.clone()) });
        debug!("created container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn start(&self, name: &str) -> Result<(), FleetError> {
        self.check_reachable()?;
        let ip = self.allocate_ip();
        let mut containers = self.containers();
        let container = containers.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        container.info.running = true;
        container.info.ip_address.get_or_insert(ip);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), FleetError> {
        self.check_reachable()?;
        let mut containers = self.containers();
        let container = containers.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        container.info.running = false;
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(FleetError::Runtime(format!("stop of {} failed", name)));
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), FleetError> {
        self.check_reachable()?;
        self.containers().remove(name).ok_or_else(|| Self::not_found(name))?;
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(FleetError::Runtime(format!("remove of {} failed", name)));
        }
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo, FleetError> {
        self.check_reachable()?;
        self.containers()
            .get(name)
            .map(|container| container.info.clone())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerInfo>, FleetError> {
        self.check_reachable()?;
        Ok(self
            .containers()
            .values()
            .filter(|container| container.info.label(key) == Some(value))
            .map(|container| container.info.clone())
            .collect())
    }
}
