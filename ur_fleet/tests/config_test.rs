use std::collections::HashMap;

use ur_fleet::drivers::REALTIME_PORT;
use ur_fleet::provisioner::RuntimeKind;
use ur_fleet::{FleetConfig, FleetError};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> =
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_empty_json_gives_defaults() {
    let config = FleetConfig::from_json("{}").unwrap();
    assert_eq!(config, FleetConfig::default());
    assert_eq!(config.websocket_port, 9000);
    assert_eq!(config.virtual_robots.max_instances, 4);
    assert_eq!(config.connection.decode_interval_ms, 40);
    assert_eq!(config.virtual_robots.runtime, RuntimeKind::Docker);
    assert!(config.validate().is_ok());
}

#[test]
fn test_robots_default_to_realtime_port() {
    let config = FleetConfig::from_json(
        r#"{
            "robots": [{ "name": "cell-1", "address": "192.168.0.12" }],
            "connection": { "retry_interval_ms": 250 },
            "virtual_robots": { "max_instances": 2, "runtime": { "kind": "memory", "ip_prefix": "127.0.0." } }
        }"#,
    )
    .unwrap();

    assert_eq!(config.robots.len(), 1);
    assert_eq!(config.robots[0].port, REALTIME_PORT);
    assert_eq!(config.robots[0].socket_address(), "192.168.0.12:30003");
    assert_eq!(config.connection.retry_interval_ms, 250);
    assert_eq!(config.connection.connect_timeout_ms, 5000);
    assert_eq!(config.virtual_robots.max_instances, 2);
    assert_eq!(
        config.virtual_robots.runtime,
        RuntimeKind::Memory { ip_prefix: "127.0.0.".to_string() }
    );
}

#[test]
fn test_malformed_json_is_a_config_error() {
    assert!(matches!(FleetConfig::from_json("{ robots"), Err(FleetError::Config(_))));
}

#[test]
fn test_environment_overrides() {
    let mut config = FleetConfig::default();
    config
        .apply_overrides(env(&[
            ("FLEET_MAX_VIRTUAL_ROBOTS", "6"),
            ("FLEET_IMAGE", "universalrobots/ursim_e-series:5.15"),
            ("FLEET_NETWORK", "lab"),
            ("WEBSOCKET_PORT", " 9100 "),
        ]))
        .unwrap();

    assert_eq!(config.virtual_robots.max_instances, 6);
    assert_eq!(config.virtual_robots.image, "universalrobots/ursim_e-series:5.15");
    assert_eq!(config.virtual_robots.network, "lab");
    assert_eq!(config.websocket_port, 9100);
}

#[test]
fn test_invalid_override_is_rejected() {
    let mut config = FleetConfig::default();
    let result = config.apply_overrides(env(&[("WEBSOCKET_PORT", "ninety")]));
    assert!(matches!(result, Err(FleetError::Config(message)) if message.contains("WEBSOCKET_PORT")));
    assert_eq!(config.websocket_port, 9000);
}

#[test]
fn test_validation_errors() {
    let mut config = FleetConfig::default();
    config.virtual_robots.max_instances = 0;
    assert!(matches!(config.validate(), Err(FleetError::Config(_))));

    let mut config = FleetConfig::default();
    config.virtual_robots.max_instances = 100;
    assert!(config.validate().is_err());

    let mut config = FleetConfig::default();
    config.connection.decode_interval_ms = 0;
    assert!(config.validate().is_err());

    let mut config = FleetConfig::from_json(r#"{ "robots": [{ "name": "blank", "address": "" }] }"#).unwrap();
    assert!(config.validate().is_err());
    config.robots[0].address = "10.0.0.5".to_string();
    assert!(config.validate().is_ok());

    let mut config = FleetConfig::default();
    config.event_capacity = 0;
    assert!(config.validate().is_err());
}
