use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use ur_fleet::drivers::{ConnectionConfig, ConnectionManager, ConnectionState, RobotEndpoint};
use ur_fleet::realtime::RealtimeRecord;
use ur_fleet::{EventBus, FleetError, FleetEvent};

fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        connect_timeout_ms: 500,
        retry_interval_ms: 50,
        decode_interval_ms: 10,
    }
}

async fn next_event(rx: &mut broadcast::Receiver<FleetEvent>, name: &str) -> FleetEvent {
    timeout(Duration::from_secs(3), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} event", name))
}

async fn accept(listener: &TcpListener) -> TcpStream {
    let (socket, _) = timeout(Duration::from_secs(3), listener.accept())
        .await
        .expect("manager never connected")
        .unwrap();
    socket
}

async fn start(listener: &TcpListener) -> (Arc<ConnectionManager>, broadcast::Receiver<FleetEvent>, String) {
    let port = listener.local_addr().unwrap().port();
    let events = EventBus::default();
    let rx = events.subscribe();
    let endpoint = RobotEndpoint::new("cell-1", "127.0.0.1", port);
    let address = endpoint.socket_address();
    let manager = ConnectionManager::new(vec![endpoint], fast_config(), events);
    (manager, rx, address)
}

#[tokio::test]
async fn test_joined_fires_on_connect_and_on_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    let socket = accept(&listener).await;
    let joined = next_event(&mut rx, "joined").await;
    assert_eq!(
        joined,
        FleetEvent::Joined { address: address.clone(), robots: vec![address.clone()] }
    );
    assert_eq!(manager.addresses().await, vec![address.clone()]);
    assert_eq!(manager.state(&address), Some(ConnectionState::Connected));

    drop(socket);
    let left = next_event(&mut rx, "joined").await;
    assert_eq!(left, FleetEvent::Joined { address: address.clone(), robots: vec![] });

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_peer_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    drop(accept(&listener).await);
    next_event(&mut rx, "joined").await;
    next_event(&mut rx, "joined").await;

    let _socket = accept(&listener).await;
    let joined = next_event(&mut rx, "joined").await;
    assert_eq!(joined, FleetEvent::Joined { address: address.clone(), robots: vec![address] });

    manager.shutdown().await;
}

#[tokio::test]
async fn test_text_chunks_become_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    let mut socket = accept(&listener).await;
    next_event(&mut rx, "joined").await;
    socket.write_all(b"Program started\n").await.unwrap();

    let message = next_event(&mut rx, "message").await;
    assert_eq!(
        message,
        FleetEvent::Message { address, text: "Program started\n".to_string() }
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_realtime_frames_are_published_raw_then_parsed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    let mut socket = accept(&listener).await;
    next_event(&mut rx, "joined").await;

    let mut record = RealtimeRecord::default();
    record.time = 42.0;
    record.q_actual = [0.0, -1.0, 1.0, 0.5, -0.5, 0.25];
    let frame = record.encode();
    socket.write_all(&frame).await.unwrap();

    let raw = next_event(&mut rx, "realtimeRaw").await;
    assert_eq!(raw, FleetEvent::RealtimeRaw { address: address.clone(), data: frame });

    let parsed = rx.recv().await.unwrap();
    assert_eq!(parsed, FleetEvent::RealtimeParsed { address, record: Box::new(record) });

    manager.shutdown().await;
}

#[tokio::test]
async fn test_send_writes_instruction_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    let mut socket = accept(&listener).await;
    next_event(&mut rx, "joined").await;

    let instruction = "movej([0,-1.57,1.57,0,0,0], a=1.2, v=0.25)\n";
    manager.send(&address, instruction).await.unwrap();

    let mut buf = vec![0u8; instruction.len()];
    timeout(Duration::from_secs(2), socket.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), instruction);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_send_to_unknown_address_fails() {
    let manager = ConnectionManager::new(Vec::new(), fast_config(), EventBus::default());
    let result = manager.send("10.1.1.1:30003", "stopj(2)\n").await;
    assert_eq!(result, Err(FleetError::ConnectionNotFound("10.1.1.1:30003".to_string())));
}

#[tokio::test]
async fn test_refused_connection_is_retried_without_duplicates() {
    // Reserve a port, then free it so the first attempts are refused.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let endpoint = RobotEndpoint::new("late", "127.0.0.1", port);
    let address = endpoint.socket_address();
    let manager = ConnectionManager::new(vec![endpoint.clone()], fast_config(), events);

    sleep(Duration::from_millis(200)).await;
    assert!(manager.addresses().await.is_empty());
    assert_ne!(manager.state(&address), Some(ConnectionState::Connected));

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let _socket = accept(&listener).await;
    next_event(&mut rx, "joined").await;

    assert!(!manager.connect(endpoint), "a second supervisor must not start");
    sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.addresses().await, vec![address.clone()]);
    assert_eq!(manager.supervised(), vec![address]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_stops_supervision() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (manager, mut rx, address) = start(&listener).await;

    let _socket = accept(&listener).await;
    next_event(&mut rx, "joined").await;

    assert!(manager.disconnect(&address).await);
    assert_eq!(
        next_event(&mut rx, "joined").await,
        FleetEvent::Joined { address: address.clone(), robots: vec![] }
    );
    assert!(manager.supervised().is_empty());
    assert_eq!(manager.state(&address), None);
    assert!(!manager.disconnect(&address).await);

    // No reconnect attempt arrives once supervision stopped.
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}
