//! Virtual robot handlers.

use tracing::{info, warn};
use ur_fleet::provisioner::CloseOutcome;
use ur_fleet::runtime::ContainerRuntime;
use ur_fleet::Fleet;

use super::error_response;
use crate::api_types::ServerResponse;

/// Waits for an admission permit, then provisions and connects.
pub async fn request<R: ContainerRuntime>(fleet: &Fleet<R>) -> ServerResponse {
    match fleet.request_virtual_robot().await {
        Ok((instance, address)) => {
            info!("Virtual robot {} ready at {}", instance.name, address);
            ServerResponse::VirtualRobot { instance, address }
        }
        Err(e) => {
            warn!("Virtual robot request failed: {}", e);
            error_response(e)
        }
    }
}

pub async fn close<R: ContainerRuntime>(fleet: &Fleet<R>, name: &str) -> ServerResponse {
    match fleet.close_virtual_robot(name).await {
        Ok(CloseOutcome::Closed(instance)) => ServerResponse::VirtualRobotClosed {
            name: instance.name,
            slot: instance.slot,
        },
        Ok(CloseOutcome::NotFound) => ServerResponse::Error {
            message: format!("Virtual robot not found: {}", name),
        },
        Err(e) => error_response(e),
    }
}

pub async fn list_instances<R: ContainerRuntime>(fleet: &Fleet<R>) -> ServerResponse {
    ServerResponse::Instances {
        instances: fleet.provisioner().instances().await,
    }
}

pub fn capacity_status<R: ContainerRuntime>(fleet: &Fleet<R>) -> ServerResponse {
    let gate = fleet.gate();
    ServerResponse::CapacityStatus {
        capacity: gate.capacity(),
        available_permits: gate.available_permits(),
        gate_open: gate.is_open(),
        free_slots: fleet.slots().free_slots(),
        leased_slots: fleet.slots().leased_slots(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::handle_request;
    use crate::api_types::ClientRequest;
    use ur_fleet::runtime::InMemoryRuntime;
    use ur_fleet::FleetConfig;

    fn fleet() -> Fleet<InMemoryRuntime> {
        let mut config = FleetConfig::default();
        config.virtual_robots.max_instances = 2;
        Fleet::new(&config, InMemoryRuntime::new("127.0.0."))
    }

    #[tokio::test]
    async fn test_request_and_close_round_trip() {
        let fleet = fleet();
        fleet.start().await.unwrap();

        let name = match handle_request(ClientRequest::RequestVirtualRobot, &fleet).await {
            ServerResponse::VirtualRobot { instance, address } => {
                assert!(address.ends_with(":30003"));
                instance.name
            }
            other => panic!("unexpected response {:?}", other),
        };
        assert_eq!(
            capacity_status(&fleet),
            ServerResponse::CapacityStatus {
                capacity: 2,
                available_permits: 1,
                gate_open: true,
                free_slots: vec![2],
                leased_slots: vec![1],
            }
        );

        let closed = handle_request(ClientRequest::CloseVirtualRobot { name: name.clone() }, &fleet).await;
        assert_eq!(closed, ServerResponse::VirtualRobotClosed { name, slot: 1 });
        fleet.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_targets_are_errors() {
        let fleet = fleet();
        let closed = handle_request(ClientRequest::CloseVirtualRobot { name: "ghost".to_string() }, &fleet).await;
        assert!(matches!(closed, ServerResponse::Error { .. }));

        let sent = handle_request(
            ClientRequest::Send {
                address: "10.9.9.9:30003".to_string(),
                instruction: "stopj(2)\n".to_string(),
            },
            &fleet,
        )
        .await;
        assert!(matches!(sent, ServerResponse::Error { message } if message.contains("10.9.9.9:30003")));
        fleet.shutdown().await;
    }
}
