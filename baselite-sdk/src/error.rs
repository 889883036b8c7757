//! Error types for the BaseLite SDK

use thiserror::Error;

use crate::transaction::TransactionOperationError;
use crate::transport::TransportError;

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for BaseLite SDK operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed arguments to a staging method, detected before any network
    /// activity. The Unit-of-Work stays usable after a usage error.
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// The remote service rejected exactly one staged operation and rolled
    /// back the whole transaction.
    #[error("Transaction failed: {0}")]
    Transaction(TransactionOperationError),

    /// The round trip itself failed (network, HTTP status, body decode)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server response did not match the transaction wire contract
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// Shorthand for a usage error with a formatted message
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }
}
