//! Fleet configuration: a JSON file plus environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drivers::{ConnectionConfig, RobotEndpoint};
use crate::provisioner::ProvisionerConfig;
use crate::FleetError;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_VAR: &str = "FLEET_CONFIG";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    /// Physical robots, supervised from startup.
    pub robots: Vec<RobotEndpoint>,
    pub connection: ConnectionConfig,
    pub virtual_robots: ProvisionerConfig,
    pub websocket_port: u16,
    pub event_capacity: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            robots: Vec::new(),
            connection: ConnectionConfig::default(),
            virtual_robots: ProvisionerConfig::default(),
            websocket_port: 9000,
            event_capacity: 1024,
        }
    }
}

impl FleetConfig {
    pub fn from_json(json: &str) -> Result<Self, FleetError> {
        serde_json::from_str(json).map_err(|e| FleetError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Reads the file named by `FLEET_CONFIG` (defaults when unset), applies
    /// environment overrides and validates the result.
    pub fn load() -> Result<Self, FleetError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                info!("loading fleet configuration from {}", path);
                Self::from_file(path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `FLEET_MAX_VIRTUAL_ROBOTS`, `FLEET_IMAGE`, `FLEET_NETWORK` and
    /// `WEBSOCKET_PORT` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), FleetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FLEET_MAX_VIRTUAL_ROBOTS") {
            self.virtual_robots.max_instances = parse_var("FLEET_MAX_VIRTUAL_ROBOTS", &value)?;
        }
        if let Some(value) = lookup("FLEET_IMAGE") {
            self.virtual_robots.image = value;
        }
        if let Some(value) = lookup("FLEET_NETWORK") {
            self.virtual_robots.network = value;
        }
        if let Some(value) = lookup("WEBSOCKET_PORT") {
            self.websocket_port = parse_var("WEBSOCKET_PORT", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FleetError> {
        for robot in &self.robots {
            robot.validate().map_err(FleetError::Config)?;
        }
        self.connection.validate().map_err(FleetError::Config)?;
        self.virtual_robots.validate().map_err(FleetError::Config)?;
        if self.event_capacity == 0 {
            return Err(FleetError::Config("Event capacity must be greater than 0.".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, FleetError> {
    value
        .trim()
        .parse()
        .map_err(|_| FleetError::Config(format!("{} has an invalid value: {}", key, value)))
}
