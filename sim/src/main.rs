// Simulated UR controller streaming realtime frames.
// Run with: cargo run -p sim

use std::sync::Arc;

use sim::{SimulatedController, DEFAULT_RATE_HZ};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ur_fleet::drivers::REALTIME_PORT;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port: u16 = env_or("SIM_PORT", REALTIME_PORT);
    let rate_hz: u32 = env_or("SIM_RATE_HZ", DEFAULT_RATE_HZ);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("Environment: SIM_PORT={} SIM_RATE_HZ={}", port, rate_hz);

    let controller = Arc::new(SimulatedController::new(rate_hz));
    if let Err(e) = controller.serve(listener).await {
        error!("simulator stopped: {}", e);
    }
}
