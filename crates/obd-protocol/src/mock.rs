//! Simulated ELM327 adapter
//!
//! Behaves like a real adapter on the wire: echo is on until `ATE0`, every
//! response ends with `\r\r>`, and responses can be delayed, fragmented or
//! withheld. Backs the demo link kind and the session tests.

use crate::error::{ObdError, Result};
use crate::link::{Device, Link, LinkKind, Radio, Target};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Address of the device reported by a fresh mock
pub const MOCK_ADDRESS: &str = "MOCK-ADDRESS-123";
/// Name of the device reported by a fresh mock
pub const MOCK_NAME: &str = "ELM327-Mock";

const IDENTITY: &str = "ELM327 v1.5";

/// Something observed on the simulated wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A command reached the adapter (without its `\r`)
    Written(String),
    /// The prompt ending the response to this command was read by the host
    Terminated(String),
}

#[derive(Debug)]
struct MockState {
    responses: HashMap<String, String>,
    silent: HashSet<String>,
    latency: Duration,
    fragment_size: Option<usize>,
    open_delay: Duration,
    deny_permissions: bool,
    fail_open: Option<ObdError>,
    devices: Vec<Device>,
    events: Vec<WireEvent>,
    raw_writes: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Idle-engine responses of a warm car
fn default_responses() -> HashMap<String, String> {
    [
        ("010D", "41 0D 00"),
        ("0105", "41 05 80"),
        ("0111", "41 11 1F"),
        ("0104", "41 04 33"),
        ("010F", "41 0F 3E"),
        ("010B", "41 0B 65"),
        ("0123", "41 23 09 00"),
        ("ATRV", "12.5V"),
        ("22F40D", "62 F4 0D 00"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Simulated adapter radio
#[derive(Clone)]
pub struct MockAdapter {
    kind: LinkKind,
    state: Arc<Mutex<MockState>>,
    remote_closed: Arc<AtomicBool>,
    rpm_ticks: Arc<AtomicU32>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::with_kind(LinkKind::Demo)
    }

    /// Mock that reports itself as `kind`
    pub fn with_kind(kind: LinkKind) -> Self {
        let device = Device::bluetooth(kind, MOCK_ADDRESS, Some(MOCK_NAME.to_string()));
        Self {
            kind,
            state: Arc::new(Mutex::new(MockState {
                responses: default_responses(),
                silent: HashSet::new(),
                latency: Duration::from_millis(20),
                fragment_size: None,
                open_delay: Duration::ZERO,
                deny_permissions: false,
                fail_open: None,
                devices: vec![device],
                events: Vec::new(),
                raw_writes: Vec::new(),
            })),
            remote_closed: Arc::new(AtomicBool::new(false)),
            rpm_ticks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The device a fresh mock reports from `scan`
    pub fn device(&self) -> Device {
        Device::bluetooth(self.kind, MOCK_ADDRESS, Some(MOCK_NAME.to_string()))
    }

    /// Reply to `command` with `response` from now on
    pub fn set_response(&self, command: &str, response: &str) {
        let mut state = lock(&self.state);
        state.silent.remove(command);
        state.responses.insert(command.to_string(), response.to_string());
    }

    /// Never answer `command`
    pub fn set_silent(&self, command: &str) {
        lock(&self.state).silent.insert(command.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = latency;
    }

    /// Deliver responses in chunks of `size` bytes
    pub fn set_fragment_size(&self, size: usize) {
        lock(&self.state).fragment_size = Some(size.max(1));
    }

    pub fn set_open_delay(&self, delay: Duration) {
        lock(&self.state).open_delay = delay;
    }

    pub fn deny_permissions(&self) {
        lock(&self.state).deny_permissions = true;
    }

    /// Make the next `open` calls fail with `error`
    pub fn fail_open(&self, error: ObdError) {
        lock(&self.state).fail_open = Some(error);
    }

    pub fn add_device(&self, device: Device) {
        lock(&self.state).devices.push(device);
    }

    /// Simulate the adapter dropping off
    pub fn close_remote(&self) {
        self.remote_closed.store(true, Ordering::Release);
    }

    /// Commands received so far, in order
    pub fn written(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Written(c) => Some(c.clone()),
                WireEvent::Terminated(_) => None,
            })
            .collect()
    }

    /// Writes exactly as received, terminators included
    pub fn raw_writes(&self) -> Vec<String> {
        lock(&self.state).raw_writes.clone()
    }

    pub fn events(&self) -> Vec<WireEvent> {
        lock(&self.state).events.clone()
    }

    pub fn clear_events(&self) {
        let mut state = lock(&self.state);
        state.events.clear();
        state.raw_writes.clear();
    }

    /// Idle RPM around 850 with a little jitter
    fn rpm_response(&self) -> String {
        let tick = self.rpm_ticks.fetch_add(1, Ordering::Relaxed);
        let raw = (850 + (tick % 5) * 4) * 4;
        format!("41 0C {:02X} {:02X}", raw >> 8, raw & 0xFF)
    }

    /// Response text for one command, `None` when it goes unanswered
    fn respond(&self, command: &str) -> Option<String> {
        let state = lock(&self.state);
        if state.silent.contains(command) {
            return None;
        }
        if let Some(response) = state.responses.get(command) {
            return Some(response.clone());
        }
        drop(state);

        let response = match command {
            "ATZ" | "ATWS" => IDENTITY.to_string(),
            "ATI" => IDENTITY.to_string(),
            "010C" => self.rpm_response(),
            c if c.starts_with("AT") => "OK".to_string(),
            c if c.starts_with("01") || c.starts_with("22") => "NO DATA".to_string(),
            _ => "?".to_string(),
        };
        Some(response)
    }
}

#[async_trait]
impl Radio for MockAdapter {
    fn kind(&self) -> LinkKind {
        self.kind
    }

    async fn request_permissions(&self) -> Result<()> {
        if lock(&self.state).deny_permissions {
            return Err(ObdError::PermissionDenied(
                "Bluetooth permissions not granted".to_string(),
            ));
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Device>> {
        Ok(lock(&self.state).devices.clone())
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn Link>> {
        let delay = lock(&self.state).open_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = lock(&self.state);
        if let Some(error) = state.fail_open.clone() {
            return Err(error);
        }
        if let Target::Bluetooth { address } = target {
            let known = state
                .devices
                .iter()
                .any(|d| matches!(&d.target, Target::Bluetooth { address: a } if a == address));
            if !known {
                return Err(ObdError::DeviceNotFound(address.clone()));
            }
        }
        drop(state);

        self.remote_closed.store(false, Ordering::Release);
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("Mock link opened to {}", target);
        Ok(Box::new(MockLink {
            adapter: self.clone(),
            tx,
            rx,
            echo: true,
        }))
    }
}

/// A chunk of response bytes; the last one names the command it ends
type Chunk = (Vec<u8>, Option<String>);

struct MockLink {
    adapter: MockAdapter,
    tx: mpsc::UnboundedSender<Chunk>,
    rx: mpsc::UnboundedReceiver<Chunk>,
    echo: bool,
}

impl MockLink {
    fn closed(&self) -> bool {
        self.adapter.remote_closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Link for MockLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed() {
            return Err(ObdError::TransportClosed);
        }

        let raw = String::from_utf8_lossy(data).to_string();
        let command = raw.trim().to_uppercase();
        {
            let mut state = lock(&self.adapter.state);
            state.raw_writes.push(raw);
            state.events.push(WireEvent::Written(command.clone()));
        }

        let Some(response) = self.adapter.respond(&command) else {
            return Ok(());
        };

        let mut wire = String::new();
        if self.echo {
            wire.push_str(&command);
            wire.push('\r');
        }
        wire.push_str(&response);
        wire.push_str("\r\r>");

        match command.as_str() {
            "ATZ" | "ATWS" | "ATE1" => self.echo = true,
            "ATE0" => self.echo = false,
            _ => {}
        }

        let (latency, fragment_size) = {
            let state = lock(&self.adapter.state);
            (state.latency, state.fragment_size)
        };
        let bytes = wire.into_bytes();
        let size = fragment_size.unwrap_or(bytes.len()).max(1);
        let mut chunks: Vec<Chunk> = bytes.chunks(size).map(|c| (c.to_vec(), None)).collect();
        if let Some(last) = chunks.last_mut() {
            last.1 = Some(command);
        }

        let tx = self.tx.clone();
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            for chunk in chunks {
                if tx.send(chunk).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        if self.closed() {
            return Err(ObdError::TransportClosed);
        }
        let (bytes, terminates) = self.rx.recv().await.ok_or(ObdError::TransportClosed)?;
        if let Some(command) = terminates {
            lock(&self.adapter.state)
                .events
                .push(WireEvent::Terminated(command));
        }
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}
