//! Bluetooth Low Energy links
//!
//! BLE ELM327 clones expose a UART-like service `FFE0` with a single
//! characteristic `FFE1`: commands are written to it and responses arrive as
//! notifications, often split into 20-byte chunks.

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::BoxStream;
use futures::StreamExt;
use obd_protocol::{Device, Link, LinkKind, ObdError, Radio, Result, Target};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// ELM327 BLE service
pub const ELM_SERVICE: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
/// ELM327 BLE read/write/notify characteristic
pub const ELM_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

fn map_ble_error(err: btleplug::Error) -> ObdError {
    match err {
        btleplug::Error::PermissionDenied => {
            ObdError::PermissionDenied("Bluetooth access denied".to_string())
        }
        btleplug::Error::DeviceNotFound => ObdError::DeviceNotFound("BLE peripheral".to_string()),
        btleplug::Error::NotConnected => ObdError::TransportClosed,
        btleplug::Error::TimedOut(d) => ObdError::ConnectionTimeout(d.as_millis() as u64),
        other => ObdError::Transport(other.to_string()),
    }
}

/// Names ELM327 BLE dongles advertise with
fn is_elm_name(name: &str) -> bool {
    let name = name.to_uppercase();
    name.contains("ELM") || name.contains("OBD")
}

fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Stable identifier; macOS hides addresses behind 00:00:00:00:00:00
fn identifier(address: &str, id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

/// BLE radio backed by the first system Bluetooth adapter
#[derive(Clone)]
pub struct BleRadio {
    adapter: Adapter,
    /// How long a scan listens for advertisements
    pub scan_duration: Duration,
}

impl BleRadio {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }

    /// Use the first Bluetooth adapter of the host
    pub async fn first_adapter() -> Result<Self> {
        let manager = Manager::new().await.map_err(map_ble_error)?;
        let adapters = manager.adapters().await.map_err(map_ble_error)?;
        adapters
            .into_iter()
            .next()
            .map(Self::new)
            .ok_or_else(|| ObdError::DeviceNotFound("no Bluetooth adapter".to_string()))
    }

    async fn find_peripheral(&self, wanted: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await.map_err(map_ble_error)?;
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            if identifier(&props.address.to_string(), &peripheral.id()) == wanted {
                return Ok(peripheral);
            }
        }
        Err(ObdError::DeviceNotFound(wanted.to_string()))
    }
}

#[async_trait]
impl Radio for BleRadio {
    fn kind(&self) -> LinkKind {
        LinkKind::BluetoothLe
    }

    async fn scan(&self) -> Result<Vec<Device>> {
        info!("Starting BLE scan for {} seconds...", self.scan_duration.as_secs());
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(map_ble_error)?;
        tokio::time::sleep(self.scan_duration).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }

        let mut devices = Vec::new();
        for peripheral in self.adapter.peripherals().await.map_err(map_ble_error)? {
            let props = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading peripheral properties: {}", e);
                    continue;
                }
            };
            let Some(name) = props.local_name.filter(|n| is_elm_name(n)) else {
                continue;
            };
            let id = identifier(&props.address.to_string(), &peripheral.id());
            devices.push(Device::bluetooth(LinkKind::BluetoothLe, id, Some(name)));
        }

        info!("BLE scan complete. Found {} adapter(s)", devices.len());
        Ok(devices)
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn Link>> {
        let Target::Bluetooth { address } = target else {
            return Err(ObdError::InvalidAddress(format!(
                "{} is not a Bluetooth address",
                target
            )));
        };

        let peripheral = self.find_peripheral(address).await?;
        if !peripheral.is_connected().await.map_err(map_ble_error)? {
            peripheral.connect().await.map_err(map_ble_error)?;
        }
        peripheral.discover_services().await.map_err(map_ble_error)?;

        let characteristic = peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == ELM_SERVICE)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|c| c.uuid == ELM_CHARACTERISTIC)
            .ok_or_else(|| {
                ObdError::DeviceNotFound(format!("{} has no FFE0/FFE1 characteristic", address))
            })?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(map_ble_error)?;
        let notifications = peripheral.notifications().await.map_err(map_ble_error)?;

        let write_type = if characteristic
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        info!("BLE link up to {}", address);
        Ok(Box::new(BleLink {
            peripheral,
            characteristic,
            write_type,
            notifications,
        }))
    }
}

struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
    notifications: BoxStream<'static, ValueNotification>,
}

#[async_trait]
impl Link for BleLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, self.write_type)
            .await
            .map_err(map_ble_error)
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        while let Some(notification) = self.notifications.next().await {
            if notification.uuid == ELM_CHARACTERISTIC {
                return Ok(notification.value);
            }
        }
        Err(ObdError::TransportClosed)
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.peripheral.unsubscribe(&self.characteristic).await {
            debug!("Unsubscribe failed: {}", e);
        }
        self.peripheral.disconnect().await.map_err(map_ble_error)
    }
}
