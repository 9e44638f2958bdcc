//! On-demand virtual robots: admission, slot lease, container lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::drivers::REALTIME_PORT;
use crate::gate::AdmissionGate;
use crate::runtime::{
    ContainerInfo, ContainerRuntime, ContainerSpec, PortBinding, SLOT_LABEL, VIRTUAL_INSTANCE_LABEL,
};
use crate::slots::{Slot, SlotAllocator};
use crate::FleetError;

pub const VNC_PORT: u16 = 5900;
pub const WEB_VNC_PORT: u16 = 6080;
/// Controller ports published for every virtual robot: dashboard, primary,
/// secondary, realtime and RTDE.
pub const CONTROLLER_PORTS: [u16; 5] = [29999, 30001, 30002, 30003, 30004];

/// Host port for `container_port` on `slot`: `3{slot:02}{port % 100:02}`.
pub fn slot_port(slot: Slot, container_port: u16) -> u16 {
    30000 + slot as u16 * 100 + container_port % 100
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    /// No engine; containers get `<ip_prefix><n>` addresses.
    Memory { ip_prefix: String },
}

impl Default for RuntimeKind {
    fn default() -> Self {
        Self::Docker
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub max_instances: u8,
    pub image: String,
    pub network: String,
    pub name_prefix: String,
    pub container_ports: Vec<u16>,
    pub vnc_base_port: u16,
    pub web_vnc_base_port: u16,
    pub env: Vec<String>,
    pub runtime: RuntimeKind,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            max_instances: 4,
            image: "universalrobots/ursim_e-series:5.12".to_string(),
            network: "robots".to_string(),
            name_prefix: "virtual-robot".to_string(),
            container_ports: CONTROLLER_PORTS.to_vec(),
            vnc_base_port: VNC_PORT,
            web_vnc_base_port: WEB_VNC_PORT,
            env: vec!["ROBOT_MODEL=UR5".to_string()],
            runtime: RuntimeKind::Docker,
        }
    }
}

impl ProvisionerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_instances == 0 || self.max_instances > 99 {
            return Err("Maximum virtual robots must be between 1 and 99.".to_string());
        }
        if self.image.is_empty() {
            return Err("Virtual robot image cannot be empty.".to_string());
        }
        if self.network.is_empty() {
            return Err("Virtual robot network cannot be empty.".to_string());
        }
        let max = self.max_instances as u32;
        if self.vnc_base_port as u32 + max > u16::MAX as u32
            || self.web_vnc_base_port as u32 + max > u16::MAX as u32
        {
            return Err("VNC base ports leave no room for every slot.".to_string());
        }
        Ok(())
    }
}

/// Host ports bound for one slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortLayout {
    pub slot: Slot,
    pub bindings: Vec<PortBinding>,
}

impl PortLayout {
    pub fn for_slot(slot: Slot, config: &ProvisionerConfig) -> Self {
        let mut bindings: Vec<PortBinding> = config
            .container_ports
            .iter()
            .map(|&container_port| PortBinding {
                container_port,
                host_port: slot_port(slot, container_port),
            })
            .collect();
        bindings.push(PortBinding {
            container_port: VNC_PORT,
            host_port: config.vnc_base_port + slot as u16,
        });
        bindings.push(PortBinding {
            container_port: WEB_VNC_PORT,
            host_port: config.web_vnc_base_port + slot as u16,
        });
        Self { slot, bindings }
    }

    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.bindings
            .iter()
            .find(|binding| binding.container_port == container_port)
            .map(|binding| binding.host_port)
    }

    pub fn control_port(&self) -> Option<u16> {
        self.host_port(REALTIME_PORT)
    }

    pub fn vnc_port(&self) -> Option<u16> {
        self.host_port(VNC_PORT)
    }

    pub fn web_vnc_port(&self) -> Option<u16> {
        self.host_port(WEB_VNC_PORT)
    }
}

#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// One running simulator container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VirtualInstanceHandle {
    pub name: String,
    pub id: String,
    pub slot: Slot,
    pub ports: PortLayout,
    pub ip_address: Option<String>,
    pub state: InstanceState,
}

/// What `close_instance` did.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// The instance as it was torn down, in state `Stopped`, with the slot
    /// read from its label (or the leased slot if the container was gone).
    Closed(VirtualInstanceHandle),
    NotFound,
}

/// Parses the zero-padded `slot` label of a container.
pub fn slot_label(info: &ContainerInfo) -> Option<Slot> {
    info.label(SLOT_LABEL).and_then(|value| value.parse::<Slot>().ok())
}

/// Creates and tears down virtual robots.
///
/// Every instance holds one admission permit and one slot for its whole
/// life. On close, the slot comes from the container's own `slot` label rather
/// than from memory, so containers that outlived a previous manager process
/// are still reclaimed correctly.
pub struct Provisioner<R: ContainerRuntime> {
    runtime: Arc<R>,
    slots: Arc<SlotAllocator>,
    gate: Arc<AdmissionGate>,
    config: ProvisionerConfig,
    instances: Mutex<BTreeMap<String, VirtualInstanceHandle>>,
}

impl<R: ContainerRuntime> Provisioner<R> {
    pub fn new(
        runtime: Arc<R>,
        slots: Arc<SlotAllocator>,
        gate: Arc<AdmissionGate>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            runtime,
            slots,
            gate,
            config,
            instances: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub async fn instances(&self) -> Vec<VirtualInstanceHandle> {
        self.instances.lock().await.values().cloned().collect()
    }

    pub async fn instance(&self, name: &str) -> Option<VirtualInstanceHandle> {
        self.instances.lock().await.get(name).cloned()
    }

    /// Waits for an admission permit, leases a slot and starts a simulator
    /// bound to that slot's ports. Returns once the container reports started.
    pub async fn request_instance(&self) -> Result<VirtualInstanceHandle, FleetError> {
        self.gate.acquire().await?;

        let slot = match self.slots.lease() {
            Ok(slot) => slot,
            Err(_) => {
                let permits_available = self.gate.available_permits();
                error!(
                    "admission permit granted but no slot is free (leased: {:?})",
                    self.slots.leased_slots()
                );
                return Err(FleetError::SlotExhaustion { permits_available });
            }
        };

        let ports = PortLayout::for_slot(slot, &self.config);
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{:02}-{}", self.config.name_prefix, slot, &suffix[..8]);
        let spec = self.container_spec(&name, &ports);

        let mut handle = VirtualInstanceHandle {
            name: name.clone(),
            id: String::new(),
            slot,
            ports,
            ip_address: None,
            state: InstanceState::Starting,
        };
        self.instances.lock().await.insert(name.clone(), handle.clone());

        match self.launch(&spec).await {
            Ok(info) => {
                handle.id = info.id;
                handle.ip_address = info.ip_address;
                handle.state = InstanceState::Running;
                self.instances.lock().await.insert(name.clone(), handle.clone());
                info!(
                    "virtual robot {} running on slot {:02} (control port {:?})",
                    name,
                    slot,
                    handle.ports.control_port()
                );
                Ok(handle)
            }
            Err(e) => {
                warn!("virtual robot {} failed to start: {}", name, e);
                self.instances.lock().await.remove(&name);
                if let Err(e) = self.runtime.remove(&name).await {
                    warn!("cleanup of {} failed: {}", name, e);
                }
                self.slots.release(slot);
                self.gate.release();
                Err(e)
            }
        }
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<ContainerInfo, FleetError> {
        let id = self.runtime.create(spec).await?;
        self.runtime.start(&spec.name).await?;
        let mut info = self.runtime.inspect(&spec.name).await?;
        if info.id.is_empty() {
            info.id = id;
        }
        Ok(info)
    }

    fn container_spec(&self, name: &str, ports: &PortLayout) -> ContainerSpec {
        let labels = HashMap::from([
            (VIRTUAL_INSTANCE_LABEL.to_string(), "true".to_string()),
            (SLOT_LABEL.to_string(), format!("{:02}", ports.slot)),
        ]);
        ContainerSpec {
            name: name.to_string(),
            image: self.config.image.clone(),
            network: self.config.network.clone(),
            env: self.config.env.clone(),
            labels,
            port_bindings: ports.bindings.clone(),
            restart_always: true,
        }
    }

    /// Stops and removes the named instance and returns its slot and permit.
    ///
    /// Unknown names (or instances already being closed) are a no-op. Stop and
    /// remove failures are logged; the slot and permit are reclaimed anyway.
    /// A container the runtime no longer knows gives back the slot it was
    /// leased. Any other inspect failure leaves the instance running.
    pub async fn close_instance(&self, name: &str) -> Result<CloseOutcome, FleetError> {
        let mut handle = {
            let mut instances = self.instances.lock().await;
            match instances.get_mut(name) {
                Some(handle) if handle.state == InstanceState::Running => {
                    handle.state = InstanceState::Stopping;
                    handle.clone()
                }
                _ => return Ok(CloseOutcome::NotFound),
            }
        };

        let info = match self.runtime.inspect(name).await {
            Ok(info) => info,
            Err(FleetError::ContainerNotFound(_)) => {
                warn!(
                    "virtual robot {} disappeared from the runtime, reclaiming leased slot {:02}",
                    name, handle.slot
                );
                self.slots.release(handle.slot);
                self.gate.release();
                self.instances.lock().await.remove(name);
                handle.state = InstanceState::Stopped;
                return Ok(CloseOutcome::Closed(handle));
            }
            Err(e) => {
                if let Some(handle) = self.instances.lock().await.get_mut(name) {
                    handle.state = InstanceState::Running;
                }
                return Err(e);
            }
        };

        let Some(slot) = slot_label(&info) else {
            error!("virtual robot {} lost its slot label; its slot and permit stay leased", name);
            self.teardown(name).await;
            self.instances.lock().await.remove(name);
            return Err(FleetError::MissingSlotLabel { name: name.to_string() });
        };
        if slot != handle.slot {
            warn!(
                "virtual robot {} is labelled slot {:02} but was leased slot {:02}",
                name, slot, handle.slot
            );
        }

        self.slots.release(slot);
        self.teardown(name).await;
        self.gate.release();
        self.instances.lock().await.remove(name);
        info!("virtual robot {} closed, slot {:02} free", name, slot);
        handle.slot = slot;
        handle.state = InstanceState::Stopped;
        Ok(CloseOutcome::Closed(handle))
    }

    /// Removes every container labelled as a virtual instance, whether or not
    /// this process created it. Slots named by the containers' labels are
    /// returned; permits are returned only for instances this process holds.
    /// One failed teardown does not stop the sweep.
    pub async fn close_all_instances(&self) -> Result<usize, FleetError> {
        let containers = self.runtime.list_by_label(VIRTUAL_INSTANCE_LABEL, "true").await?;
        let mut closed = 0;
        for info in containers {
            let name = info.name.clone();
            self.teardown(&name).await;
            let tracked = self.instances.lock().await.remove(&name).is_some();
            match slot_label(&info) {
                Some(slot) => {
                    self.slots.release(slot);
                    if tracked {
                        self.gate.release();
                    }
                }
                None => warn!("virtual robot {} has no slot label; nothing to reclaim", name),
            }
            closed += 1;
        }
        info!("removed {} virtual robot containers", closed);
        Ok(closed)
    }

    async fn teardown(&self, name: &str) {
        if let Err(e) = self.runtime.stop(name).await {
            warn!("stop of {} failed: {}", name, e);
        }
        if let Err(e) = self.runtime.remove(name).await {
            warn!("remove of {} failed: {}", name, e);
        }
    }
}
