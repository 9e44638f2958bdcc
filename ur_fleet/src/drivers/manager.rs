use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{ConnectionConfig, ConnectionState, RobotConnection, RobotEndpoint, REALTIME_PORT};
use crate::events::{EventBus, FleetEvent};
use crate::provisioner::VirtualInstanceHandle;
use crate::realtime::{classify, Chunk, RealtimeSampler};
use crate::FleetError;

const READ_BUFFER_SIZE: usize = 8192;

/// Owns every supervised robot socket.
///
/// Each endpoint gets one supervisor task that connects, runs the session and
/// reconnects after [`ConnectionConfig::retry_interval`] for as long as the
/// manager lives. Live sessions are kept in a registry keyed by
/// `address:port`; every insert and removal publishes
/// [`FleetEvent::Joined`] with the registry contents after the change.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    events: EventBus,
    registry: RwLock<BTreeMap<String, RobotConnection>>,
    states: StdMutex<HashMap<String, ConnectionState>>,
    supervisors: StdMutex<HashMap<String, JoinHandle<()>>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionManager {
    /// Creates the manager and starts supervising every configured endpoint.
    /// Must be called from within a tokio runtime.
    pub fn new(endpoints: Vec<RobotEndpoint>, config: ConnectionConfig, events: EventBus) -> Arc<Self> {
        let manager = Arc::new(Self {
            config,
            events,
            registry: RwLock::new(BTreeMap::new()),
            states: StdMutex::new(HashMap::new()),
            supervisors: StdMutex::new(HashMap::new()),
        });
        for endpoint in endpoints {
            manager.connect(endpoint);
        }
        manager
    }

    /// Starts supervising `endpoint`. Returns `false` if its address is
    /// already supervised.
    pub fn connect(self: &Arc<Self>, endpoint: RobotEndpoint) -> bool {
        let address = endpoint.socket_address();
        let mut supervisors = lock(&self.supervisors);
        if supervisors.contains_key(&address) {
            debug!("{} is already supervised", address);
            return false;
        }
        lock(&self.states).insert(address.clone(), ConnectionState::Disconnected);
        let manager = Arc::clone(self);
        let supervisor = tokio::spawn(async move { manager.supervise(endpoint).await });
        supervisors.insert(address, supervisor);
        true
    }

    /// Supervises a virtual robot on its container network address.
    pub fn connect_virtual_robot(self: &Arc<Self>, handle: &VirtualInstanceHandle) -> Result<String, FleetError> {
        let ip = handle.ip_address.clone().ok_or_else(|| {
            FleetError::Runtime(format!("virtual robot {} has no network address", handle.name))
        })?;
        let endpoint = RobotEndpoint::new(handle.name.clone(), ip, REALTIME_PORT);
        let address = endpoint.socket_address();
        self.connect(endpoint);
        Ok(address)
    }

    /// Stops supervising `address`. The session task (and with it the decode
    /// timer) is cancelled before the registry entry is removed.
    pub async fn disconnect(&self, address: &str) -> bool {
        let supervisor = lock(&self.supervisors).remove(address);
        let Some(supervisor) = supervisor else {
            return false;
        };
        supervisor.abort();
        let _ = supervisor.await;
        lock(&self.states).remove(address);
        self.unregister(address).await;
        info!("stopped supervising {}", address);
        true
    }

    pub async fn shutdown(&self) {
        let addresses: Vec<String> = lock(&self.supervisors).keys().cloned().collect();
        for address in addresses {
            self.disconnect(&address).await;
        }
    }

    /// Writes `instruction` to the robot as UTF-8 without waiting for any
    /// acknowledgement.
    pub async fn send(&self, address: &str, instruction: &str) -> Result<(), FleetError> {
        let writer = {
            let registry = self.registry.read().await;
            registry
                .get(address)
                .map(|connection| Arc::clone(&connection.writer))
                .ok_or_else(|| FleetError::ConnectionNotFound(address.to_string()))?
        };
        let mut writer = writer.lock().await;
        writer
            .write_all(instruction.as_bytes())
            .await
            .map_err(|e| FleetError::FailedToSend(e.to_string()))?;
        debug!("{} <- {}", address, instruction.trim_end());
        Ok(())
    }

    /// Addresses with a live session, in registry order.
    pub async fn addresses(&self) -> Vec<String> {
        self.registry.read().await.keys().cloned().collect()
    }

    pub async fn connection(&self, address: &str) -> Option<RobotConnection> {
        self.registry.read().await.get(address).cloned()
    }

    pub fn state(&self, address: &str) -> Option<ConnectionState> {
        lock(&self.states).get(address).copied()
    }

    pub fn supervised(&self) -> Vec<String> {
        let mut addresses: Vec<String> = lock(&self.supervisors).keys().cloned().collect();
        addresses.sort();
        addresses
    }

    fn set_state(&self, address: &str, state: ConnectionState) {
        if let Some(current) = lock(&self.states).get_mut(address) {
            *current = state;
        }
    }

    async fn supervise(self: Arc<Self>, endpoint: RobotEndpoint) {
        let address = endpoint.socket_address();
        let retry = self.config.retry_interval();
        loop {
            self.set_state(&address, ConnectionState::Connecting);
            match timeout(self.config.connect_timeout(), TcpStream::connect(&address)).await {
                Ok(Ok(stream)) => {
                    self.run_session(&endpoint, stream).await;
                    info!("{} ({}) disconnected, reconnecting in {:?}", endpoint.name, address, retry);
                }
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                    warn!("{} ({}) refused connection, retrying in {:?}", endpoint.name, address, retry);
                }
                Ok(Err(e)) => {
                    error!("{} ({}) connect failed: {}, retrying in {:?}", endpoint.name, address, e, retry);
                }
                Err(_) => {
                    warn!(
                        "{} ({}) connect timed out after {:?}, retrying in {:?}",
                        endpoint.name,
                        address,
                        self.config.connect_timeout(),
                        retry
                    );
                }
            }
            self.set_state(&address, ConnectionState::Disconnected);
            sleep(retry).await;
        }
    }

    async fn run_session(&self, endpoint: &RobotEndpoint, stream: TcpStream) {
        let address = endpoint.socket_address();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("{}: could not set TCP_NODELAY: {}", address, e);
        }
        let (reader, writer) = stream.into_split();
        self.register(endpoint, writer).await;
        self.set_state(&address, ConnectionState::Connected);

        match self.pump(&address, reader).await {
            Ok(()) => debug!("{} closed the connection", address),
            Err(e) => warn!("{} read failed: {}", address, e),
        }

        self.unregister(&address).await;
    }

    /// Reads until the socket closes while ticking the decode timer. The timer
    /// is dropped with this future, before the caller unregisters.
    async fn pump(&self, address: &str, mut reader: OwnedReadHalf) -> std::io::Result<()> {
        let mut sampler = RealtimeSampler::new(address);
        let mut ticker = interval(self.config.decode_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    self.dispatch(address, &buf[..n], &mut sampler);
                }
                _ = ticker.tick() => {
                    sampler.tick(&self.events);
                }
            }
        }
    }

    fn dispatch(&self, address: &str, chunk: &[u8], sampler: &mut RealtimeSampler) {
        match classify(chunk) {
            Chunk::Realtime(frame) => sampler.store(frame),
            Chunk::Text(text) => {
                debug!("{} -> {}", address, text.trim_end());
                self.events.publish(FleetEvent::Message {
                    address: address.to_string(),
                    text,
                });
            }
        }
    }

    async fn register(&self, endpoint: &RobotEndpoint, writer: OwnedWriteHalf) {
        let address = endpoint.socket_address();
        let mut registry = self.registry.write().await;
        registry.insert(
            address.clone(),
            RobotConnection {
                endpoint: endpoint.clone(),
                connected_at: Instant::now(),
                writer: Arc::new(Mutex::new(writer)),
            },
        );
        info!("{} ({}) connected, {} robots online", endpoint.name, address, registry.len());
        self.events.publish(FleetEvent::Joined {
            address,
            robots: registry.keys().cloned().collect(),
        });
    }

    async fn unregister(&self, address: &str) -> bool {
        let mut registry = self.registry.write().await;
        if registry.remove(address).is_none() {
            return false;
        }
        self.events.publish(FleetEvent::Joined {
            address: address.to_string(),
            robots: registry.keys().cloned().collect(),
        });
        true
    }
}
