//! WebSocket API types.
//!
//! Requests and responses travel as JSON text frames tagged by `type`.
//! Realtime telemetry travels as bincode-encoded [`RelayFrame`]s in binary
//! frames.

use serde::{Deserialize, Serialize};
use ur_fleet::drivers::ConnectionState;
use ur_fleet::provisioner::VirtualInstanceHandle;
use ur_fleet::realtime::RealtimeRecord;
use ur_fleet::slots::Slot;

/// Client requests to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Write a URScript line to a connected robot.
    #[serde(rename = "send")]
    Send { address: String, instruction: String },

    /// Waits for capacity, so the reply may arrive much later.
    #[serde(rename = "request_virtual_robot")]
    RequestVirtualRobot,

    #[serde(rename = "close_virtual_robot")]
    CloseVirtualRobot { name: String },

    #[serde(rename = "list_robots")]
    ListRobots,

    #[serde(rename = "list_instances")]
    ListInstances,

    #[serde(rename = "capacity_status")]
    CapacityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotStatus {
    pub address: String,
    pub name: Option<String>,
    pub state: ConnectionState,
    /// Seconds since the current session was established.
    pub connected_secs: Option<u64>,
}

/// Server responses and pushed events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerResponse {
    #[serde(rename = "success")]
    Success { message: String },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "robots")]
    Robots { robots: Vec<RobotStatus> },

    #[serde(rename = "virtual_robot")]
    VirtualRobot {
        instance: VirtualInstanceHandle,
        address: String,
    },

    #[serde(rename = "virtual_robot_closed")]
    VirtualRobotClosed { name: String, slot: Slot },

    #[serde(rename = "instances")]
    Instances { instances: Vec<VirtualInstanceHandle> },

    #[serde(rename = "capacity_status")]
    CapacityStatus {
        capacity: usize,
        available_permits: usize,
        gate_open: bool,
        free_slots: Vec<Slot>,
        leased_slots: Vec<Slot>,
    },

    // Pushed to every client
    #[serde(rename = "joined")]
    Joined { address: String, robots: Vec<String> },

    #[serde(rename = "message")]
    Message { address: String, text: String },

    #[serde(rename = "capacity_reached")]
    CapacityReached,
}

/// Realtime telemetry relayed in binary WebSocket frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RelayFrame {
    Raw { address: String, data: Vec<u8> },
    Parsed { address: String, record: RealtimeRecord },
}
