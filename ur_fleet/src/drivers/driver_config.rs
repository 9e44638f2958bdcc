use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port the controller streams realtime frames on and accepts script lines.
pub const REALTIME_PORT: u16 = 30003;

/// A robot controller to supervise.
///
/// ```rust,ignore
/// let endpoint = RobotEndpoint::new("ur5e-cell-1", "192.168.0.12", REALTIME_PORT);
/// endpoint.validate()?;
/// manager.connect(endpoint);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RobotEndpoint {
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cameras: Vec<String>,
}

fn default_port() -> u16 {
    REALTIME_PORT
}

impl RobotEndpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            cameras: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err(format!("Robot {} has an empty address.", self.name));
        }
        if self.port == 0 {
            return Err(format!("Robot {} port must be greater than 0.", self.name));
        }
        Ok(())
    }

    /// `address:port`, the key the connection registry uses.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Timing of connection supervision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
    /// Fixed delay between connect attempts; there is no backoff.
    pub retry_interval_ms: u64,
    /// Realtime decode cadence (40 ms = 25 Hz).
    pub decode_interval_ms: u64,
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn decode_interval(&self) -> Duration {
        Duration::from_millis(self.decode_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("Connect timeout must be greater than 0.".to_string());
        }
        if self.retry_interval_ms == 0 {
            return Err("Retry interval must be greater than 0.".to_string());
        }
        if self.decode_interval_ms == 0 {
            return Err("Decode interval must be greater than 0.".to_string());
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            retry_interval_ms: 1000,
            decode_interval_ms: 40,
        }
    }
}
