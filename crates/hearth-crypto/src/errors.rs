//! Crypto error types.

use thiserror::Error;

/// Errors produced by the envelope primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Decryption or message parsing failed. Padding failures,
    /// structural failures, and type-tag mismatches all collapse into
    /// this variant so callers cannot be used as a decryption oracle.
    #[error("Could not decrypt message")]
    Rejected,

    /// The algorithm or provider reached a state that valid input can
    /// never produce. Fatal.
    #[error("Cryptographic fault: {0}")]
    Fault(String),
}

/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
