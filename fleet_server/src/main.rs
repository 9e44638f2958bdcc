// WebSocket server that relays UR fleet events and virtual robot requests
// Run with: cargo run -p fleet_server

mod api_types;
mod handlers;
mod relay;
mod session;

use std::sync::Arc;

use api_types::{ClientRequest, ServerResponse};
use futures_util::StreamExt;
use handlers::handle_request;
use session::ClientManager;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use ur_fleet::provisioner::RuntimeKind;
use ur_fleet::runtime::{ContainerRuntime, DockerRuntime, InMemoryRuntime};
use ur_fleet::{Fleet, FleetConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match FleetConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    match config.virtual_robots.runtime.clone() {
        RuntimeKind::Docker => match DockerRuntime::connect_local() {
            Ok(runtime) => {
                let runtime = runtime.with_network(config.virtual_robots.network.clone());
                serve(config, runtime).await
            }
            Err(e) => error!("Failed to set up the Docker client: {}", e),
        },
        RuntimeKind::Memory { ip_prefix } => {
            info!("Using in-memory container runtime ({}*)", ip_prefix);
            serve(config, InMemoryRuntime::new(ip_prefix)).await
        }
    }
}

async fn serve<R: ContainerRuntime>(config: FleetConfig, runtime: R) {
    let fleet = Arc::new(Fleet::new(&config, runtime));
    let client_manager = Arc::new(ClientManager::new());

    tokio::spawn(relay::run(fleet.subscribe(), Arc::clone(&client_manager)));

    // Requests wait at the admission gate until the sweep finishes
    let fleet_start = Arc::clone(&fleet);
    tokio::spawn(async move {
        if let Err(e) = fleet_start.start().await {
            warn!("Virtual robots unavailable: {}", e);
        }
    });

    let websocket_addr = format!("0.0.0.0:{}", config.websocket_port);
    let ws_listener = match tokio::net::TcpListener::bind(&websocket_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", websocket_addr, e);
            return;
        }
    };
    info!("WebSocket server listening on ws://{}", websocket_addr);
    info!(
        "   {} physical robots, up to {} virtual robots",
        config.robots.len(),
        config.virtual_robots.max_instances
    );

    loop {
        tokio::select! {
            accepted = ws_listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New WebSocket connection from {}", addr);
                    tokio::spawn(handle_connection(stream, Arc::clone(&fleet), Arc::clone(&client_manager)));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
    fleet.shutdown().await;
}

async fn handle_connection<R: ContainerRuntime>(
    stream: tokio::net::TcpStream,
    fleet: Arc<Fleet<R>>,
    client_manager: Arc<ClientManager>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
    let client_id = client_manager.register(Arc::clone(&ws_sender)).await;

    // Send the current robot list so the client does not wait for the next change
    let robots = handlers::robots::list_robots(&fleet).await;
    client_manager.send_to_client(client_id, &robots).await;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientRequest>(&text) {
                Ok(request) => {
                    info!("Received API request: {:?}", request);
                    // Virtual robot requests may wait for capacity; answer each one
                    // independently so the socket keeps being read.
                    let fleet = Arc::clone(&fleet);
                    let client_manager = Arc::clone(&client_manager);
                    tokio::spawn(async move {
                        let response = handle_request(request, &fleet).await;
                        client_manager.send_to_client(client_id, &response).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to parse API request: {} - {}", e, text);
                    let error_response = ServerResponse::Error {
                        message: format!("Invalid request: {}", e),
                    };
                    client_manager.send_to_client(client_id, &error_response).await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    client_manager.unregister(client_id).await;
    info!("WebSocket connection closed for client {}", client_id);
}
