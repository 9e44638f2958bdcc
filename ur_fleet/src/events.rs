//! Typed event fan-out consumed by the relay layer.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::realtime::RealtimeRecord;

/// Everything the core publishes. Serialized with the event names the session
/// layer already understands.
///
/// `Joined` is published both when a robot connects and when it drops; the
/// payload always carries the full registry snapshot after the change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FleetEvent {
    Joined { address: String, robots: Vec<String> },
    Message { address: String, text: String },
    RealtimeRaw { address: String, data: Vec<u8> },
    RealtimeParsed { address: String, record: Box<RealtimeRecord> },
    CapacityReached,
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::Joined { .. } => "joined",
            FleetEvent::Message { .. } => "message",
            FleetEvent::RealtimeRaw { .. } => "realtimeRaw",
            FleetEvent::RealtimeParsed { .. } => "realtimeParsed",
            FleetEvent::CapacityReached => "capacityReached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FleetEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: FleetEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!("no subscribers for {} event", name);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
