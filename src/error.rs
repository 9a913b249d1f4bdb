//! Errors surfaced by the kettle client.
use crate::{protocol as proto, transport::TransportError};

/// Represents all possible errors of a kettle operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A read or write was attempted without a live link.
    #[error("Not connected to the kettle")]
    NotConnected,

    /// Every connection attempt failed, `source` is the last failure.
    #[error("Failed to connect to the kettle after {attempts} attempts")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Wraps `TransportError`.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wraps `proto::Error`.
    #[error(transparent)]
    Protocol(#[from] proto::Error),
}

/// The result type for kettle operations.
pub type Result<T> = std::result::Result<T, Error>;
