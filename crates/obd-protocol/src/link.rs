//! Physical link abstraction
//!
//! A [`Radio`] is the platform capability that can discover adapters and open
//! a [`Link`] to one of them. Bluetooth Classic, BLE, WiFi TCP and WiFi
//! WebSocket all implement the same pair of traits so the session layer never
//! needs to know which one is active.

use crate::error::{ObdError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default TCP port of WiFi ELM327 adapters
pub const DEFAULT_WIFI_PORT: u16 = 35000;

/// Physical link used to reach an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// Bluetooth Classic SPP (RFCOMM)
    BluetoothClassic,
    /// Bluetooth Low Energy GATT
    BluetoothLe,
    /// WiFi raw TCP socket
    Wifi,
    /// WiFi WebSocket
    WifiWebSocket,
    /// Simulated adapter
    Demo,
}

impl LinkKind {
    /// How long a command may wait for its prompt
    pub fn default_command_timeout(&self) -> Duration {
        match self {
            LinkKind::Wifi | LinkKind::WifiWebSocket => Duration::from_secs(5),
            _ => Duration::from_secs(3),
        }
    }

    pub fn is_wifi(&self) -> bool {
        matches!(self, LinkKind::Wifi | LinkKind::WifiWebSocket)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LinkKind::BluetoothClassic => "Bluetooth",
            LinkKind::BluetoothLe => "Bluetooth LE",
            LinkKind::Wifi => "WiFi",
            LinkKind::WifiWebSocket => "WiFi (WebSocket)",
            LinkKind::Demo => "Demo",
        }
    }
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    /// Paired device address or platform identifier
    Bluetooth { address: String },
    /// Adapter access point
    Wifi { ip: Ipv4Addr, port: u16 },
}

impl Target {
    /// Validate a user supplied dotted-quad IPv4 address
    pub fn wifi(ip: &str, port: u16) -> Result<Self> {
        let ip: Ipv4Addr = ip
            .trim()
            .parse()
            .map_err(|_| ObdError::InvalidAddress(format!("Invalid IP address format: {}", ip)))?;
        if port == 0 {
            return Err(ObdError::InvalidAddress("port must be non-zero".to_string()));
        }
        Ok(Target::Wifi { ip, port })
    }

    pub fn bluetooth(address: impl Into<String>) -> Self {
        Target::Bluetooth {
            address: address.into(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Bluetooth { address } => f.write_str(address),
            Target::Wifi { ip, port } => write!(f, "{}:{}", ip, port),
        }
    }
}

/// A discovered or manually added adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: LinkKind,
    pub target: Target,
    pub connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
}

impl Device {
    /// Adapter reached over Bluetooth (or the demo radio)
    pub fn bluetooth(kind: LinkKind, address: impl Into<String>, name: Option<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            name: name.unwrap_or_else(|| "ELM327 Device".to_string()),
            kind,
            target: Target::bluetooth(address),
            connected: false,
            last_connected: None,
        }
    }

    /// Adapter reached over WiFi
    pub fn wifi(kind: LinkKind, ip: &str, port: u16) -> Result<Self> {
        let target = Target::wifi(ip, port)?;
        Ok(Self {
            id: format!("wifi-{}", target),
            name: format!("ELM327 WiFi ({})", ip.trim()),
            kind,
            target,
            connected: false,
            last_connected: None,
        })
    }
}

/// How a link delimits responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Buffer fragments until the `>` prompt
    #[default]
    Prompt,
    /// Every message is one complete response
    Message,
}

/// An open byte channel to an adapter
#[async_trait]
pub trait Link: Send {
    /// Write raw bytes (the command already carries its `\r`)
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next fragment of incoming data.
    ///
    /// Returns [`ObdError::TransportClosed`] once the remote end is gone.
    /// Must be cancel safe: dropping the future loses no data.
    async fn read(&mut self) -> Result<Vec<u8>>;

    fn framing(&self) -> Framing {
        Framing::Prompt
    }

    /// Release the underlying link
    async fn close(&mut self) -> Result<()>;
}

/// Platform capability for one link kind
#[async_trait]
pub trait Radio: Send + Sync {
    fn kind(&self) -> LinkKind;

    /// Ask the platform for access (Bluetooth permissions etc.)
    async fn request_permissions(&self) -> Result<()> {
        Ok(())
    }

    /// Power up the radio if the platform requires it
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    /// List reachable adapters
    async fn scan(&self) -> Result<Vec<Device>>;

    /// Open a link to `target`
    async fn open(&self, target: &Target) -> Result<Box<dyn Link>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_target_validation() {
        assert!(Target::wifi("192.168.0.10", 35000).is_ok());
        assert!(Target::wifi("256.1.1.1", 35000).is_err());
        assert!(Target::wifi("1.2.3", 35000).is_err());
        assert!(Target::wifi("adapter.local", 35000).is_err());
        assert!(Target::wifi("192.168.0.10", 0).is_err());
    }

    #[test]
    fn test_wifi_device_identity() {
        let device = Device::wifi(LinkKind::Wifi, "192.168.0.10", DEFAULT_WIFI_PORT).unwrap();
        assert_eq!(device.id, "wifi-192.168.0.10:35000");
        assert_eq!(device.name, "ELM327 WiFi (192.168.0.10)");
        assert!(!device.connected);
    }

    #[test]
    fn test_command_timeouts() {
        assert_eq!(LinkKind::Wifi.default_command_timeout(), Duration::from_secs(5));
        assert_eq!(
            LinkKind::BluetoothClassic.default_command_timeout(),
            Duration::from_secs(3)
        );
    }
}
