//! API request handlers for WebSocket messages.
//!
//! - `robots`: physical and virtual robot connections (send/list)
//! - `virtual_robots`: provisioning and capacity

pub mod robots;
pub mod virtual_robots;

use ur_fleet::runtime::ContainerRuntime;
use ur_fleet::{Fleet, FleetError};

use crate::api_types::{ClientRequest, ServerResponse};

/// Handle a client API request and return a response.
pub async fn handle_request<R: ContainerRuntime>(request: ClientRequest, fleet: &Fleet<R>) -> ServerResponse {
    match request {
        ClientRequest::Send { address, instruction } => robots::send(fleet, &address, &instruction).await,
        ClientRequest::ListRobots => robots::list_robots(fleet).await,
        ClientRequest::RequestVirtualRobot => virtual_robots::request(fleet).await,
        ClientRequest::CloseVirtualRobot { name } => virtual_robots::close(fleet, &name).await,
        ClientRequest::ListInstances => virtual_robots::list_instances(fleet).await,
        ClientRequest::CapacityStatus => virtual_robots::capacity_status(fleet),
    }
}

fn error_response(e: FleetError) -> ServerResponse {
    ServerResponse::Error { message: e.to_string() }
}
