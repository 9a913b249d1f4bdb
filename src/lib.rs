//! A library for controlling Fellow Stagg EKG Pro kettles over Bluetooth LE.
//!
//! The kettle exposes its whole configuration as one 17 byte register on a
//! single characteristic. Every change is a read-modify-write of that register,
//! stamped with the current time and a sequence counter.
//!
//! The crate is layered:
//!
//! 1.  **Codec**: [`protocol`] decodes the register into a [`protocol::KettleState`]
//!     and encodes [`protocol::Mutation`]s back into it. It is pure and does no I/O.
//! 2.  **Client**: [`client::Kettle`] manages the connection, caches the last
//!     known register, spaces writes and sequences multi-write changes such as
//!     schedule updates.
//! 3.  **Transport**: the client reaches the kettle through the
//!     [`transport::Connector`] and [`transport::Link`] traits. The `ble`
//!     feature provides an implementation on top of `btleplug`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stagg_ekg_lib::{ble, client::Kettle, protocol::TemperatureUnit};
//! use std::time::Duration;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let characteristic: Uuid = "00000000-0000-0000-0000-000000000000".parse()?;
//!     let device = ble::find_by_address("AA:BB:CC:DD:EE:FF", Duration::from_secs(5)).await?;
//!     let kettle = Kettle::new(ble::BleConnector::new(characteristic));
//!
//!     kettle.set_temperature(&device, 96.0, TemperatureUnit::Celsius).await?;
//!     if let Some(state) = kettle.poll(&device).await {
//!         println!("{state}");
//!     }
//!     kettle.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod connection;
pub mod debounce;
pub mod error;
pub mod protocol;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "ble")))]
#[cfg(feature = "ble")]
pub mod ble;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
