//! Credential store error types.

use thiserror::Error;

/// Errors produced by the credential store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No entry exists for the given identifier.
    #[error("Credentials for [{0}] are not available")]
    NotAvailable(String),

    /// An entry already exists for the given identifier.
    #[error("Credentials for [{0}] already exist")]
    AlreadyExists(String),

    /// The backing file could not be read or written.
    #[error("Credential store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be parsed or serialized.
    #[error("Credential store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;
