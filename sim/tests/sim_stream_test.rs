use std::sync::Arc;
use std::time::Duration;

use sim::SimulatedController;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use ur_fleet::drivers::{ConnectionConfig, ConnectionManager, RobotEndpoint};
use ur_fleet::realtime::{RealtimeRecord, RobotMode, FRAME_SIZE};
use ur_fleet::{EventBus, FleetEvent};

async fn spawn_sim(rate_hz: u32) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let controller = Arc::new(SimulatedController::new(rate_hz));
    tokio::spawn(controller.serve(listener));
    port
}

#[tokio::test]
async fn test_streams_full_frames() {
    let port = spawn_sim(100).await;
    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let mut previous = -1.0;
    for _ in 0..3 {
        let mut frame = vec![0u8; FRAME_SIZE];
        timeout(Duration::from_secs(2), socket.read_exact(&mut frame))
            .await
            .unwrap()
            .unwrap();
        let record = RealtimeRecord::decode(&frame).unwrap();
        assert_eq!(record.robot_mode(), Some(RobotMode::Running));
        assert!(record.time > previous);
        previous = record.time;
    }
}

#[tokio::test]
async fn test_manager_decodes_simulator_and_gets_acks() {
    let port = spawn_sim(50).await;
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let endpoint = RobotEndpoint::new("sim", "127.0.0.1", port);
    let address = endpoint.socket_address();
    let config = ConnectionConfig {
        decode_interval_ms: 20,
        ..ConnectionConfig::default()
    };
    let manager = ConnectionManager::new(vec![endpoint], config, events);

    let parsed = timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(FleetEvent::RealtimeParsed { address: from, record }) = rx.recv().await {
                return (from, record);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(parsed.0, address);
    assert_eq!(parsed.1.robot_mode(), Some(RobotMode::Running));

    manager
        .send(&address, "movej([0,-1.2,1.2,0,0,0], a=1.2, v=0.5)\n")
        .await
        .unwrap();
    let ack = timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(FleetEvent::Message { text, .. }) = rx.recv().await {
                if text.contains("ack: movej") {
                    return text;
                }
            }
        }
    })
    .await;
    assert!(ack.is_ok(), "no acknowledgement for movej");

    manager.shutdown().await;
}
