//! Connection management
//!
//! [`ConnectionManager`] is what the dashboard talks to: it owns the known
//! devices, the registered radios and at most one active [`ObdClient`].

use crate::client::{ClientConfig, ObdClient};
use crate::error::{ObdError, Result};
use crate::link::{Device, LinkKind, Radio};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Snapshot of the connection as shown to the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub devices: Vec<Device>,
    pub current_device: Option<Device>,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
}

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connected { device: Device },
    Disconnected { device_id: String },
    Failed { device_id: String, error: String },
}

/// Owns the active session and the device list
#[derive(Clone)]
pub struct ConnectionManager {
    radios: HashMap<LinkKind, Arc<dyn Radio>>,
    config: ClientConfig,
    wifi_kind: LinkKind,
    state: Arc<RwLock<ConnectionState>>,
    session: Arc<RwLock<Option<ObdClient>>>,
    /// Bumped by every user disconnect; a connect started before it is void
    disconnects: Arc<AtomicU64>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            radios: HashMap::new(),
            config,
            wifi_kind: LinkKind::Wifi,
            state: Arc::new(RwLock::new(ConnectionState::default())),
            session: Arc::new(RwLock::new(None)),
            disconnects: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Register the radio serving its link kind
    pub fn with_radio(mut self, radio: Arc<dyn Radio>) -> Self {
        self.radios.insert(radio.kind(), radio);
        self
    }

    /// Link kind used for manually added WiFi adapters
    pub fn with_wifi_kind(mut self, kind: LinkKind) -> Self {
        if kind.is_wifi() {
            self.wifi_kind = kind;
        }
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Active session, if any
    pub async fn client(&self) -> Option<ObdClient> {
        self.session.read().await.clone()
    }

    /// Discover adapters on every registered radio.
    ///
    /// Manually added WiFi devices survive a rescan. Fails only when every
    /// radio failed.
    pub async fn scan(&self) -> Result<Vec<Device>> {
        let mut found = Vec::new();
        let mut last_error = None;
        let mut scanned = 0;

        for radio in self.radios.values() {
            if radio.kind().is_wifi() {
                continue;
            }
            scanned += 1;
            let result = async {
                radio.request_permissions().await?;
                radio.enable().await?;
                radio.scan().await
            }
            .await;
            match result {
                Ok(devices) => {
                    info!("{} scan found {} device(s)", radio.kind().label(), devices.len());
                    found.extend(devices);
                }
                Err(e) => {
                    warn!("{} scan failed: {}", radio.kind().label(), e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            if found.is_empty() && scanned > 0 {
                self.state.write().await.error = Some(e.to_string());
                return Err(e);
            }
        }

        let mut state = self.state.write().await;
        let current = state.current_device.as_ref().map(|d| d.id.clone());
        let manual: Vec<Device> = state
            .devices
            .iter()
            .filter(|d| d.kind.is_wifi())
            .cloned()
            .collect();

        let mut devices = manual;
        for mut device in found {
            if devices.iter().any(|d| d.id == device.id) {
                continue;
            }
            device.connected = current.as_deref() == Some(device.id.as_str()) && state.is_connected;
            devices.push(device);
        }
        state.devices = devices.clone();
        Ok(devices)
    }

    /// Add a WiFi adapter by address
    pub async fn add_wifi_device(&self, ip: &str, port: u16) -> Result<Device> {
        let device = Device::wifi(self.wifi_kind, ip, port)?;
        let mut state = self.state.write().await;
        if let Some(existing) = state.devices.iter().find(|d| d.id == device.id) {
            return Ok(existing.clone());
        }
        info!("Added WiFi device {}", device.target);
        state.devices.push(device.clone());
        Ok(device)
    }

    /// Connect to a known device, tearing down any existing session first
    pub async fn connect(&self, device_id: &str) -> Result<Device> {
        let device = {
            let mut state = self.state.write().await;
            if state.is_connecting {
                return Err(ObdError::ConnectInProgress);
            }
            let device = state.devices.iter().find(|d| d.id == device_id).cloned();
            let Some(device) = device else {
                drop(state);
                let err = ObdError::DeviceNotFound(device_id.to_string());
                self.fail(device_id, &err).await;
                return Err(err);
            };
            state.is_connecting = true;
            state.error = None;
            device
        };
        let generation = self.disconnects.load(Ordering::Acquire);

        self.close_session().await;

        let result = match self.radios.get(&device.kind) {
            Some(radio) => ObdClient::connect(radio.as_ref(), &device, self.config.clone()).await,
            None => Err(ObdError::Transport(format!(
                "{} links are not available",
                device.kind.label()
            ))),
        };

        match result {
            Ok(client) => {
                let connected = client.device().clone();
                {
                    let mut session = self.session.write().await;
                    if self.disconnects.load(Ordering::Acquire) != generation {
                        drop(session);
                        info!("Disconnect requested while connecting to {}", connected.name);
                        client.disconnect().await;
                        self.state.write().await.is_connecting = false;
                        return Err(ObdError::Disconnected);
                    }
                    *session = Some(client.clone());
                }
                {
                    let mut state = self.state.write().await;
                    state.is_connecting = false;
                    state.is_connected = true;
                    state.current_device = Some(connected.clone());
                    for d in state.devices.iter_mut() {
                        d.connected = d.id == connected.id;
                        if d.connected {
                            d.last_connected = Some(Utc::now());
                        }
                    }
                }
                info!("Connected to {}", connected.name);
                let _ = self.events.send(ConnectionEvent::Connected {
                    device: connected.clone(),
                });
                self.watch(client);
                Ok(connected)
            }
            Err(e) => {
                self.fail(device_id, &e).await;
                Err(e)
            }
        }
    }

    async fn fail(&self, device_id: &str, err: &ObdError) {
        error!("Connection to {} failed: {}", device_id, err);
        {
            let mut state = self.state.write().await;
            state.is_connecting = false;
            state.is_connected = false;
            state.error = Some(err.to_string());
        }
        let _ = self.events.send(ConnectionEvent::Failed {
            device_id: device_id.to_string(),
            error: err.to_string(),
        });
    }

    /// Mark the session gone once its link drops
    fn watch(&self, client: ObdClient) {
        let manager = self.clone();
        tokio::spawn(async move {
            client.closed().await;
            let mut session = manager.session.write().await;
            let current = session
                .as_ref()
                .map(|c| c.same_session(&client))
                .unwrap_or(false);
            if !current {
                return;
            }
            session.take();
            drop(session);
            warn!("Lost connection to {}", client.device().name);
            manager.mark_disconnected(&client.device().id).await;
        });
    }

    async fn mark_disconnected(&self, device_id: &str) {
        {
            let mut state = self.state.write().await;
            state.is_connected = false;
            state.current_device = None;
            for d in state.devices.iter_mut() {
                d.connected = false;
            }
        }
        let _ = self.events.send(ConnectionEvent::Disconnected {
            device_id: device_id.to_string(),
        });
    }

    /// Close the active session, if any, and void a connect in progress
    pub async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::AcqRel);
        self.close_session().await;
    }

    async fn close_session(&self) {
        let client = self.session.write().await.take();
        if let Some(client) = client {
            client.disconnect().await;
            self.mark_disconnected(&client.device().id).await;
        }
    }

    /// Send a raw command over the active session
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let client = self.client().await.ok_or(ObdError::NotConnected)?;
        client.send_command(command).await
    }

    /// One-line status for display
    pub async fn status_text(&self) -> String {
        let state = self.state.read().await;
        if state.is_connecting {
            "Connecting...".to_string()
        } else if let (true, Some(device)) = (state.is_connected, &state.current_device) {
            format!("Connected to {}", device.name)
        } else if let Some(error) = &state.error {
            format!("Error: {}", error)
        } else {
            "Disconnected".to_string()
        }
    }
}
