//! Forwards fleet events to WebSocket clients.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use ur_fleet::FleetEvent;

use crate::api_types::{RelayFrame, ServerResponse};
use crate::session::ClientManager;

/// Maps an event to the frame clients receive: JSON text for lifecycle events,
/// bincode binary for realtime telemetry.
pub fn to_message(event: FleetEvent) -> Result<Message, String> {
    let response = match event {
        FleetEvent::Joined { address, robots } => ServerResponse::Joined { address, robots },
        FleetEvent::Message { address, text } => ServerResponse::Message { address, text },
        FleetEvent::CapacityReached => ServerResponse::CapacityReached,
        FleetEvent::RealtimeRaw { address, data } => {
            return encode_frame(&RelayFrame::Raw { address, data });
        }
        FleetEvent::RealtimeParsed { address, record } => {
            return encode_frame(&RelayFrame::Parsed {
                address,
                record: *record,
            });
        }
    };
    serde_json::to_string(&response)
        .map(Message::Text)
        .map_err(|e| format!("Serialization error: {}", e))
}

fn encode_frame(frame: &RelayFrame) -> Result<Message, String> {
    bincode::serialize(frame)
        .map(Message::Binary)
        .map_err(|e| format!("Serialization error: {}", e))
}

/// Runs until the event bus closes.
pub async fn run(mut events: broadcast::Receiver<FleetEvent>, clients: Arc<ClientManager>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let name = event.name();
                match to_message(event) {
                    Ok(message) => clients.broadcast_message(message).await,
                    Err(e) => warn!("dropping {} event: {}", name, e),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Relay lagged {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("event bus closed, relay stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ur_fleet::realtime::RealtimeRecord;

    #[test]
    fn test_lifecycle_events_are_text() {
        let message = to_message(FleetEvent::Message {
            address: "10.0.0.5:30003".to_string(),
            text: "ack\n".to_string(),
        })
        .unwrap();
        match message {
            Message::Text(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["type"], "message");
                assert_eq!(value["text"], "ack\n");
            }
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_realtime_events_are_binary() {
        let record = RealtimeRecord::default();
        let message = to_message(FleetEvent::RealtimeParsed {
            address: "10.0.0.5:30003".to_string(),
            record: Box::new(record.clone()),
        })
        .unwrap();
        match message {
            Message::Binary(bytes) => {
                let frame: RelayFrame = bincode::deserialize(&bytes).unwrap();
                assert_eq!(
                    frame,
                    RelayFrame::Parsed {
                        address: "10.0.0.5:30003".to_string(),
                        record,
                    }
                );
            }
            other => panic!("expected binary frame, got {:?}", other),
        }
    }
}
