//! `btleplug` backed transport and kettle discovery.

use crate::transport::{Connector, Link, NotifyFn, TransportError};
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager};
use futures::StreamExt;
use log::*;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use btleplug::platform::Peripheral;

/// Name fragments advertised by Stagg kettles.
const KETTLE_NAME_HINTS: [&str; 3] = ["stagg", "fellow", "ekg"];

/// A device seen during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_kettle: bool,
}

/// Whether an advertised name matches a known kettle name.
pub fn looks_like_kettle(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    KETTLE_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

/// The first Bluetooth adapter of the system.
pub async fn adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(TransportError::NoAdapter)
}

async fn scan_peripherals(
    adapter: &Adapter,
    duration: Duration,
) -> Result<Vec<Peripheral>, TransportError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;
    let peripherals = adapter.peripherals().await?;
    adapter.stop_scan().await?;
    Ok(peripherals)
}

/// Scans for `duration` and lists every advertising device, kettles flagged.
pub async fn scan(duration: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
    let adapter = adapter().await?;
    let mut devices = Vec::new();
    for peripheral in scan_peripherals(&adapter, duration).await? {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let is_kettle = looks_like_kettle(&name);
            devices.push(DiscoveredDevice {
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                is_kettle,
                name,
            });
        }
    }
    Ok(devices)
}

/// Scans for `duration` and returns the device with the given address.
pub async fn find_by_address(
    address: &str,
    duration: Duration,
) -> Result<Peripheral, TransportError> {
    let adapter = adapter().await?;
    for peripheral in scan_peripherals(&adapter, duration).await? {
        if peripheral.address().to_string().eq_ignore_ascii_case(address) {
            debug!("Found kettle {address}");
            return Ok(peripheral);
        }
    }
    Err(TransportError::DeviceNotFound(address.to_string()))
}

/// Connects peripherals and binds them to the kettle's configuration characteristic.
#[derive(Debug, Clone)]
pub struct BleConnector {
    characteristic: Uuid,
}

impl BleConnector {
    /// Connector writing to `characteristic` once connected.
    pub fn new(characteristic: Uuid) -> Self {
        Self { characteristic }
    }
}

#[async_trait]
impl Connector for BleConnector {
    type Device = Peripheral;
    type Link = BleLink;

    async fn connect(&self, device: &Peripheral) -> Result<BleLink, TransportError> {
        if !device.is_connected().await? {
            device.connect().await?;
        }
        let characteristic = release_on_error(self.bind(device).await, device.disconnect()).await?;
        Ok(BleLink {
            peripheral: device.clone(),
            characteristic,
            listener: Mutex::new(None),
        })
    }
}

impl BleConnector {
    async fn bind(&self, device: &Peripheral) -> Result<Characteristic, TransportError> {
        device.discover_services().await?;
        device
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.characteristic)
            .ok_or_else(|| TransportError::CharacteristicNotFound(self.characteristic.to_string()))
    }
}

/// Awaits `release` when `result` is an error, so a half set up device is not left connected.
async fn release_on_error<T, E, R>(
    result: Result<T, TransportError>,
    release: R,
) -> Result<T, TransportError>
where
    E: std::fmt::Display,
    R: Future<Output = Result<(), E>>,
{
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!("Releasing device after failed setup: {err}");
            if let Err(release_err) = release.await {
                debug!("Cannot release device: {release_err}");
            }
            Err(err)
        }
    }
}

pub struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BleLink {
    fn stop_listener(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

#[async_trait]
impl Link for BleLink {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn read(&self) -> Result<Vec<u8>, TransportError> {
        Ok(self.peripheral.read(&self.characteristic).await?)
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, on_notify: NotifyFn) -> Result<(), TransportError> {
        self.peripheral.subscribe(&self.characteristic).await?;
        let notifications = self.peripheral.notifications().await.map_err(TransportError::from);
        let mut notifications =
            release_on_error(notifications, self.peripheral.unsubscribe(&self.characteristic))
                .await?;
        let uuid = self.characteristic.uuid;
        let listener = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    on_notify(notification.value.as_slice());
                }
            }
            debug!("Notification stream closed");
        });
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.stop_listener();
        self.peripheral.unsubscribe(&self.characteristic).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_listener();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn failed_setup_releases_device() {
        let released = AtomicBool::new(false);
        let result: Result<(), _> = release_on_error(
            Err(TransportError::CharacteristicNotFound("fff1".into())),
            async {
                released.store(true, Ordering::SeqCst);
                Ok::<(), TransportError>(())
            },
        )
        .await;
        assert!(matches!(result, Err(TransportError::CharacteristicNotFound(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_setup_keeps_device() {
        let released = AtomicBool::new(false);
        let result = release_on_error(Ok(7), async {
            released.store(true, Ordering::SeqCst);
            Ok::<(), TransportError>(())
        })
        .await;
        assert_eq!(result.ok(), Some(7));
        assert!(!released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_failure_keeps_setup_error() {
        let result: Result<(), _> = release_on_error(
            Err(TransportError::Disconnected),
            async { Err::<(), _>(TransportError::NoAdapter) },
        )
        .await;
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }

    #[test]
    fn kettle_names() {
        assert!(looks_like_kettle("Stagg EKG Pro"));
        assert!(looks_like_kettle("FELLOW-1234"));
        assert!(looks_like_kettle("ekg+"));
        assert!(!looks_like_kettle("Unknown"));
        assert!(!looks_like_kettle("Bhumi-01"));
    }
}
