//! Application configuration
//!
//! Loaded from an optional TOML file and `ELM_DASHBOARD__*` environment
//! variables (`ELM_DASHBOARD__SERVER__ADDR=0.0.0.0:9000`), on top of the
//! defaults below.

use alerting::AlertConfig;
use obd_protocol::{ClientConfig, FallbackPolicy, Framing, InitSequence, LinkKind, ObdProtocol};
use obd_scheduler::PollerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "elm-dashboard.toml";
const ENV_PREFIX: &str = "ELM_DASHBOARD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub link: LinkConfig,
    pub session: SessionConfig,
    pub polling: PollingConfig,
    pub alerts: AlertConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (host:port)
    pub addr: String,
    /// Serve `/metrics`
    pub prometheus: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            prometheus: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial baud rate for Bluetooth Classic adapters
    pub baud_rate: u32,
    /// Look for a BLE adapter at startup
    pub ble: bool,
    /// Register the simulated adapter
    pub demo: bool,
    /// Kind given to manually added WiFi adapters
    pub wifi_kind: LinkKind,
    /// Response framing of WebSocket bridges
    pub websocket_framing: Framing,
    /// Device id to connect to at startup
    pub auto_connect: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: ObdProtocol::Auto.default_baud_rate(),
            ble: true,
            demo: true,
            wifi_kind: LinkKind::Wifi,
            websocket_framing: Framing::Prompt,
            auto_connect: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub handshake_timeout_ms: u64,
    /// Per-command window; unset uses 3 s (Bluetooth) or 5 s (WiFi)
    pub command_timeout_ms: Option<u64>,
    pub protocol: ObdProtocol,
    /// Send `ATS0`/`ATH0` after the mandatory init commands
    pub compact_responses: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
            command_timeout_ms: None,
            protocol: ObdProtocol::Auto,
            compact_responses: true,
        }
    }
}

impl SessionConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            command_timeout: self.command_timeout_ms.map(Duration::from_millis),
            init: InitSequence {
                protocol: self.protocol,
                compact_responses: self.compact_responses,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub history_capacity: usize,
    pub fallback: FallbackPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            history_capacity: 30,
            fallback: FallbackPolicy::Simulate,
        }
    }
}

impl PollingConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            history_capacity: self.history_capacity,
            fallback: self.fallback,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the config file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
