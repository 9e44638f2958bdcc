//! The application context: every long-lived service, built once.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::FleetConfig;
use crate::drivers::ConnectionManager;
use crate::events::{EventBus, FleetEvent};
use crate::gate::AdmissionGate;
use crate::provisioner::{CloseOutcome, Provisioner, VirtualInstanceHandle};
use crate::runtime::ContainerRuntime;
use crate::slots::SlotAllocator;
use crate::FleetError;

/// Owns the slot allocator, admission gate, provisioner and connection
/// manager and wires them to one event bus.
pub struct Fleet<R: ContainerRuntime> {
    events: EventBus,
    slots: Arc<SlotAllocator>,
    gate: Arc<AdmissionGate>,
    provisioner: Arc<Provisioner<R>>,
    connections: Arc<ConnectionManager>,
}

impl<R: ContainerRuntime> Fleet<R> {
    /// Builds the services and starts supervising the configured physical
    /// robots. The admission gate stays closed until [`Fleet::start`].
    pub fn new(config: &FleetConfig, runtime: R) -> Self {
        let events = EventBus::new(config.event_capacity);
        let capacity = config.virtual_robots.max_instances;
        let slots = Arc::new(SlotAllocator::new(capacity));
        let gate = Arc::new(AdmissionGate::new(capacity as usize, events.clone()));
        let provisioner = Arc::new(Provisioner::new(
            Arc::new(runtime),
            Arc::clone(&slots),
            Arc::clone(&gate),
            config.virtual_robots.clone(),
        ));
        let connections = ConnectionManager::new(
            config.robots.clone(),
            config.connection.clone(),
            events.clone(),
        );
        Self {
            events,
            slots,
            gate,
            provisioner,
            connections,
        }
    }

    /// Pings the container runtime, sweeps leftover virtual robots and only
    /// then opens the admission gate. If the runtime is unreachable the gate
    /// stays closed and virtual robot requests wait indefinitely.
    pub async fn start(&self) -> Result<(), FleetError> {
        if let Err(e) = self.provisioner.runtime().ping().await {
            error!("container runtime unreachable, virtual robots unavailable: {}", e);
            return Err(e);
        }
        let swept = self.provisioner.close_all_instances().await?;
        if swept > 0 {
            warn!("removed {} leftover virtual robots", swept);
        }
        self.gate.open();
        info!("fleet ready");
        Ok(())
    }

    /// Provisions a virtual robot and starts supervising it. Returns the
    /// handle and the registry address it will appear under.
    pub async fn request_virtual_robot(&self) -> Result<(VirtualInstanceHandle, String), FleetError> {
        let handle = self.provisioner.request_instance().await?;
        match self.connections.connect_virtual_robot(&handle) {
            Ok(address) => Ok((handle, address)),
            Err(e) => {
                warn!("closing {}: {}", handle.name, e);
                self.provisioner.close_instance(&handle.name).await?;
                Err(e)
            }
        }
    }

    /// Drops the robot's connection (decode timer first), then tears down
    /// its container. If the close fails while the instance is still tracked,
    /// supervision is restored so the two never disagree.
    pub async fn close_virtual_robot(&self, name: &str) -> Result<CloseOutcome, FleetError> {
        let handle = self.provisioner.instance(name).await;
        if let Some(ip) = handle.as_ref().and_then(|handle| handle.ip_address.as_ref()) {
            let address = format!("{}:{}", ip, crate::drivers::REALTIME_PORT);
            self.connections.disconnect(&address).await;
        }
        match self.provisioner.close_instance(name).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Some(tracked) = self.provisioner.instance(name).await {
                    warn!("close of {} failed, resuming supervision: {}", name, e);
                    if let Err(reconnect) = self.connections.connect_virtual_robot(&tracked) {
                        error!("could not resume supervision of {}: {}", name, reconnect);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn send(&self, address: &str, instruction: &str) -> Result<(), FleetError> {
        self.connections.send(address, instruction).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    /// Stops every supervisor and wakes pending virtual robot requests.
    pub async fn shutdown(&self) {
        self.gate.close();
        self.connections.shutdown().await;
        info!("fleet stopped");
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn slots(&self) -> &Arc<SlotAllocator> {
        &self.slots
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn provisioner(&self) -> &Arc<Provisioner<R>> {
        &self.provisioner
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}
