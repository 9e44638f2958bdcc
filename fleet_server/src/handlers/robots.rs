//! Robot connection handlers.

use tracing::warn;
use ur_fleet::runtime::ContainerRuntime;
use ur_fleet::Fleet;

use super::error_response;
use crate::api_types::{RobotStatus, ServerResponse};

pub async fn send<R: ContainerRuntime>(fleet: &Fleet<R>, address: &str, instruction: &str) -> ServerResponse {
    match fleet.send(address, instruction).await {
        Ok(()) => ServerResponse::Success {
            message: format!("Sent to {}", address),
        },
        Err(e) => {
            warn!("Failed to send to {}: {}", address, e);
            error_response(e)
        }
    }
}

/// Every supervised address with its current state.
pub async fn list_robots<R: ContainerRuntime>(fleet: &Fleet<R>) -> ServerResponse {
    let connections = fleet.connections();
    let mut robots = Vec::new();
    for address in connections.supervised() {
        let connection = connections.connection(&address).await;
        robots.push(RobotStatus {
            name: connection.as_ref().map(|c| c.endpoint.name.clone()),
            connected_secs: connection.as_ref().map(|c| c.connected_at.elapsed().as_secs()),
            state: connections.state(&address).unwrap_or_default(),
            address,
        });
    }
    ServerResponse::Robots { robots }
}
