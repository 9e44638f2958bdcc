use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use super::RobotEndpoint;

/// Supervision state of one endpoint. Cycles until the manager shuts down.
#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A live TCP session registered under its endpoint's socket address.
#[derive(Debug, Clone)]
pub struct RobotConnection {
    pub endpoint: RobotEndpoint,
    pub connected_at: Instant,
    pub(crate) writer: Arc<Mutex<OwnedWriteHalf>>,
}
