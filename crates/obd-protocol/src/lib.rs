//! OBD-II Protocol Implementation
//!
//! This crate talks to ELM327-compatible OBD-II adapters: it frames and
//! decodes adapter responses, runs a serialized command session over any
//! [`Link`], and tracks which adapter is connected. Concrete Bluetooth and
//! WiFi links live in `obd-link`; [`mock::MockAdapter`] simulates one.

mod client;
pub mod codec;
mod error;
mod fallback;
pub mod framing;
mod link;
mod manager;
pub mod mock;
mod pid;
mod protocol;

pub use client::{ClientConfig, ObdClient};
pub use codec::{Codec, Reading, Sample};
pub use error::{ObdError, Result};
pub use fallback::{FallbackGenerator, FallbackPolicy, FallbackReason};
pub use link::{Device, Framing, Link, LinkKind, Radio, Target, DEFAULT_WIFI_PORT};
pub use manager::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use pid::{NominalRange, Pid, PidRequest};
pub use protocol::{InitSequence, ObdProtocol};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Manufacturer enhanced data by identifier
    pub const ENHANCED_DATA: u8 = 0x22;
    /// Added to the request mode in a positive response
    pub const POSITIVE_OFFSET: u8 = 0x40;
}

/// Current time as Unix milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
