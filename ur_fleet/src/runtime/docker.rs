use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, HostConfig, PortBinding as DockerPortBinding,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use tracing::debug;

use super::{ContainerInfo, ContainerRuntime, ContainerSpec};
use crate::FleetError;

/// Seconds the engine waits for a simulator to exit before killing it.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker engine reached over its local socket (or `DOCKER_HOST`).
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    network: Option<String>,
}

fn runtime_error(e: bollard::errors::Error) -> FleetError {
    FleetError::Runtime(e.to_string())
}

fn container_error(name: &str, e: bollard::errors::Error) -> FleetError {
    match e {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
            FleetError::ContainerNotFound(name.to_string())
        }
        e => runtime_error(e),
    }
}

impl DockerRuntime {
    pub fn connect_local() -> Result<Self, FleetError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| FleetError::RuntimeUnreachable(e.to_string()))?;
        Ok(Self { docker, network: None })
    }

    /// Prefer this network when reading a container's address.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    fn pick_ip<'a, I>(&self, networks: I) -> Option<String>
    where
        I: IntoIterator<Item = (&'a String, &'a Option<String>)>,
    {
        let mut fallback = None;
        for (name, ip) in networks {
            let Some(ip) = ip.as_ref().filter(|ip| !ip.is_empty()) else {
                continue;
            };
            if self.network.as_deref() == Some(name.as_str()) {
                return Some(ip.clone());
            }
            fallback.get_or_insert_with(|| ip.clone());
        }
        fallback
    }

    fn from_inspect(&self, response: ContainerInspectResponse) -> ContainerInfo {
        let networks = response
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default();
        let ips: Vec<(String, Option<String>)> = networks
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address))
            .collect();
        ContainerInfo {
            id: response.id.unwrap_or_default(),
            name: response
                .name
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            labels: response.config.and_then(|config| config.labels).unwrap_or_default(),
            running: response.state.and_then(|state| state.running).unwrap_or(false),
            ip_address: self.pick_ip(ips.iter().map(|(name, ip)| (name, ip))),
        }
    }

    fn from_summary(&self, summary: ContainerSummary) -> ContainerInfo {
        let networks = summary
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default();
        let ips: Vec<(String, Option<String>)> = networks
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address))
            .collect();
        ContainerInfo {
            id: summary.id.unwrap_or_default(),
            name: summary
                .names
                .and_then(|names| names.into_iter().next())
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            running: summary.state.as_deref() == Some("running"),
            ip_address: self.pick_ip(ips.iter().map(|(name, ip)| (name, ip))),
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), FleetError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| FleetError::RuntimeUnreachable(e.to_string()))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, FleetError> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for binding in &spec.port_bindings {
            let key = format!("{}/tcp", binding.container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![DockerPortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(binding.host_port.to_string()),
                }]),
            );
        }

        let restart_policy = spec.restart_always.then(|| RestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            maximum_retry_count: None,
        });

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                network_mode: Some(spec.network.clone()),
                restart_policy,
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(runtime_error)?;
        for warning in &response.warnings {
            debug!("create {}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start(&self, name: &str) -> Result<(), FleetError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn stop(&self, name: &str) -> Result<(), FleetError> {
        self.docker
            .stop_container(name, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn remove(&self, name: &str) -> Result<(), FleetError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo, FleetError> {
        let response = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error(name, e))?;
        Ok(self.from_inspect(response))
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerInfo>, FleetError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(runtime_error)?;
        Ok(summaries
            .into_iter()
            .map(|summary| self.from_summary(summary))
            .collect())
    }
}
