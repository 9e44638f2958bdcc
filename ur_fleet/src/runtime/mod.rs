//! Container engine seam used by the provisioner.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::FleetError;

#[cfg(feature = "docker")]
mod docker;
#[cfg(feature = "docker")]
pub use docker::DockerRuntime;

mod memory;
pub use memory::InMemoryRuntime;

/// Label marking containers owned by the provisioner.
pub const VIRTUAL_INSTANCE_LABEL: &str = "virtual-instance";
/// Label carrying the zero-padded slot number of a container.
pub const SLOT_LABEL: &str = "slot";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub port_bindings: Vec<PortBinding>,
    pub restart_always: bool,
}

/// Live container metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
    pub ip_address: Option<String>,
}

impl ContainerInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Operations the provisioner needs from a container engine. Containers are
/// addressed by name.
pub trait ContainerRuntime: Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Creates the container and returns its id.
    fn create(&self, spec: &ContainerSpec) -> impl Future<Output = Result<String, FleetError>> + Send;

    fn start(&self, name: &str) -> impl Future<Output = Result<(), FleetError>> + Send;

    fn stop(&self, name: &str) -> impl Future<Output = Result<(), FleetError>> + Send;

    fn remove(&self, name: &str) -> impl Future<Output = Result<(), FleetError>> + Send;

    fn inspect(&self, name: &str) -> impl Future<Output = Result<ContainerInfo, FleetError>> + Send;

    /// Lists every container, running or not, carrying `key=value`.
    fn list_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<Vec<ContainerInfo>, FleetError>> + Send;
}
