//! Connected WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::SinkExt;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_types::ServerResponse;

/// Type alias for WebSocket sender
pub type WsSender = Arc<Mutex<futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    Message
>>>;

/// A connected client with its WebSocket sender.
#[derive(Clone)]
pub struct Client {
    pub id: Uuid,
    pub sender: WsSender,
}

impl Client {
    pub fn new(sender: WsSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Send a response to this client.
    pub async fn send(&self, response: &ServerResponse) -> Result<(), String> {
        let json = serde_json::to_string(response)
            .map_err(|e| format!("Serialization error: {}", e))?;
        self.send_message(Message::Text(json)).await
    }

    pub async fn send_message(&self, message: Message) -> Result<(), String> {
        let mut sender = self.sender.lock().await;
        sender.send(message).await
            .map_err(|e| format!("Send error: {}", e))
    }
}

#[derive(Default)]
pub struct ClientManager {
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its ID.
    pub async fn register(&self, sender: WsSender) -> Uuid {
        let client = Client::new(sender);
        let id = client.id;
        let mut clients = self.clients.write().await;
        clients.insert(id, client);
        info!("Client {} registered ({} total)", id, clients.len());
        id
    }

    pub async fn unregister(&self, client_id: Uuid) {
        let mut clients = self.clients.write().await;
        if clients.remove(&client_id).is_some() {
            info!("Client {} unregistered ({} remaining)", client_id, clients.len());
        }
    }

    pub async fn get(&self, client_id: Uuid) -> Option<Client> {
        let clients = self.clients.read().await;
        clients.get(&client_id).cloned()
    }

    /// Send a response to a specific client.
    pub async fn send_to_client(&self, client_id: Uuid, response: &ServerResponse) {
        if let Some(client) = self.get(client_id).await {
            if let Err(e) = client.send(response).await {
                warn!("Failed to send to client {}: {}", client_id, e);
            }
        }
    }

    /// Broadcast a prepared frame (text or binary) to all connected clients.
    pub async fn broadcast_message(&self, message: Message) {
        let clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        for client in clients {
            if let Err(e) = client.send_message(message.clone()).await {
                warn!("Failed to send to client {}: {}", client.id, e);
            }
        }
    }
}
