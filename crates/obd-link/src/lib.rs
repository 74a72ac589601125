//! Physical links to ELM327 adapters
//!
//! Each radio implements [`obd_protocol::Radio`] for one [`LinkKind`]:
//!
//! - [`SerialRadio`]: Bluetooth Classic SPP through an RFCOMM serial device
//! - [`BleRadio`]: Bluetooth Low Energy, service `FFE0` / characteristic `FFE1`
//! - [`TcpRadio`]: WiFi adapters speaking raw TCP
//! - [`WebSocketRadio`]: WiFi adapters behind a WebSocket bridge

mod ble;
mod serial;
mod stream;
mod tcp;
mod websocket;

pub use ble::{BleRadio, ELM_CHARACTERISTIC, ELM_SERVICE};
pub use serial::SerialRadio;
pub use stream::StreamLink;
pub use tcp::TcpRadio;
pub use websocket::WebSocketRadio;

pub use obd_protocol::LinkKind;
