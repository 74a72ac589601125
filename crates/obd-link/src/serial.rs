//! Bluetooth Classic SPP links
//!
//! Paired SPP adapters show up as serial devices (`/dev/rfcomm0`, `COM5`),
//! so the link is a plain serial port opened with tokio-serial.

use crate::stream::StreamLink;
use async_trait::async_trait;
use obd_protocol::{Device, Link, LinkKind, ObdError, ObdProtocol, Radio, Result, Target};
use tokio_serial::{SerialPortBuilderExt, SerialPortType};
use tracing::{debug, info};

/// Serial port radio for Bluetooth Classic adapters
#[derive(Debug, Clone)]
pub struct SerialRadio {
    /// Baud rate for serial communication
    pub baud_rate: u32,
    /// Also list ports that do not look like Bluetooth (USB cables)
    pub include_wired: bool,
}

impl Default for SerialRadio {
    fn default() -> Self {
        Self {
            baud_rate: ObdProtocol::Auto.default_baud_rate(),
            include_wired: true,
        }
    }
}

impl SerialRadio {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }
}

fn is_bluetooth_port(name: &str, port_type: &SerialPortType) -> bool {
    matches!(port_type, SerialPortType::BluetoothPort) || name.contains("rfcomm")
}

fn port_label(name: &str, port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| format!("USB serial ({})", name)),
        SerialPortType::BluetoothPort => format!("ELM327 Bluetooth ({})", name),
        _ if name.contains("rfcomm") => format!("ELM327 Bluetooth ({})", name),
        _ => name.to_string(),
    }
}

pub(crate) fn map_serial_error(err: tokio_serial::Error, path: &str) -> ObdError {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => ObdError::DeviceNotFound(path.to_string()),
        tokio_serial::ErrorKind::InvalidInput => ObdError::InvalidAddress(err.to_string()),
        tokio_serial::ErrorKind::Io(kind) => std::io::Error::new(kind, err.description).into(),
        tokio_serial::ErrorKind::Unknown => ObdError::Transport(err.to_string()),
    }
}

#[async_trait]
impl Radio for SerialRadio {
    fn kind(&self) -> LinkKind {
        LinkKind::BluetoothClassic
    }

    async fn scan(&self) -> Result<Vec<Device>> {
        let ports =
            tokio_serial::available_ports().map_err(|e| ObdError::Transport(e.to_string()))?;

        let devices: Vec<Device> = ports
            .into_iter()
            .filter(|p| self.include_wired || is_bluetooth_port(&p.port_name, &p.port_type))
            .map(|p| {
                let label = port_label(&p.port_name, &p.port_type);
                Device::bluetooth(LinkKind::BluetoothClassic, p.port_name, Some(label))
            })
            .collect();

        debug!("Found {} serial port(s)", devices.len());
        Ok(devices)
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn Link>> {
        let Target::Bluetooth { address } = target else {
            return Err(ObdError::InvalidAddress(format!(
                "{} is not a serial device",
                target
            )));
        };

        info!("Opening {} at {} baud", address, self.baud_rate);
        let port = tokio_serial::new(address.as_str(), self.baud_rate)
            .open_native_async()
            .map_err(|e| map_serial_error(e, address))?;

        Ok(Box::new(StreamLink::new(port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfcomm_is_bluetooth() {
        assert!(is_bluetooth_port("/dev/rfcomm0", &SerialPortType::Unknown));
        assert!(!is_bluetooth_port("/dev/ttyS0", &SerialPortType::Unknown));
        assert_eq!(
            port_label("/dev/rfcomm0", &SerialPortType::Unknown),
            "ELM327 Bluetooth (/dev/rfcomm0)"
        );
    }

    #[test]
    fn test_error_mapping() {
        let err = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "gone");
        assert_eq!(
            map_serial_error(err, "/dev/rfcomm0"),
            ObdError::DeviceNotFound("/dev/rfcomm0".into())
        );

        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "denied",
        );
        assert!(matches!(
            map_serial_error(err, "/dev/rfcomm0"),
            ObdError::PermissionDenied(_)
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_wifi_target() {
        let radio = SerialRadio::default();
        let target = Target::wifi("192.168.0.10", 35000).unwrap();
        assert!(matches!(
            radio.open(&target).await,
            Err(ObdError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_port() {
        let radio = SerialRadio::default();
        let result = radio.open(&Target::bluetooth("/dev/does-not-exist-obd")).await;
        assert!(result.is_err());
    }
}
