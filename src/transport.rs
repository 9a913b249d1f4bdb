//! The seam between the kettle client and a BLE stack.
//!
//! A [`Connector`] turns a device handle, as produced by the stack's discovery,
//! into a [`Link`] bound to the kettle's configuration characteristic. The
//! client only ever talks to that one characteristic, so a link exposes plain
//! read, write and notify primitives on it.

use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked with the payload of every characteristic notification.
pub type NotifyFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("No Bluetooth adapter found")]
    NoAdapter,
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(String),
    #[error("Device disconnected")]
    Disconnected,
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "ble")]
impl From<btleplug::Error> for TransportError {
    fn from(err: btleplug::Error) -> Self {
        TransportError::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Connectable device handle handed out by the BLE stack.
    type Device: Send + Sync;
    type Link: Link;

    /// Makes a single connection attempt, retries are up to the caller.
    async fn connect(&self, device: &Self::Device) -> Result<Self::Link, TransportError>;
}

#[async_trait]
pub trait Link: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn read(&self) -> Result<Vec<u8>, TransportError>;

    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Starts delivering characteristic notifications to `on_notify`.
    async fn subscribe(&self, on_notify: NotifyFn) -> Result<(), TransportError>;

    async fn unsubscribe(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
