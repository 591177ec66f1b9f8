//! Authentication error types and the RPC-boundary translation.

use hearth_crypto::CryptoError;
use hearth_storage::StorageError;
use thiserror::Error;

/// Errors produced by the protocol handlers and the controller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The principal is absent from the credential store.
    #[error("{0} is not available")]
    NotAvailable(String),

    /// Authenticator/ticket mismatch, failed crypto, or a violated
    /// administrative precondition. Reasons are human-readable and do
    /// not distinguish crypto-oracle signals.
    #[error("{0}")]
    Rejected(String),

    /// The authenticator timestamp fell outside the ticket validity
    /// period or the server skew window. Distinct from [`Rejected`]
    /// so clients know to renew.
    ///
    /// [`Rejected`]: AuthError::Rejected
    #[error("Session expired")]
    SessionExpired,

    /// An authorization check failed.
    #[error("{0}")]
    PermissionDenied(String),

    /// Impossible algorithm or provider state. Fatal.
    #[error("Cryptographic fault: {0}")]
    CryptoFault(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Translate for the RPC boundary.
    ///
    /// Remote callers only ever observe `NotAvailable`, `SessionExpired`
    /// or `Rejected`: permission denials keep their reason but lose the
    /// distinct kind, and fatal faults are collapsed to a generic
    /// rejection so internal causes never leak.
    pub fn into_remote(self) -> AuthError {
        match self {
            AuthError::PermissionDenied(reason) => AuthError::Rejected(reason),
            AuthError::CryptoFault(_) => {
                AuthError::Rejected("Internal server error. Please try again.".to_string())
            }
            other => other,
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Rejected => AuthError::Rejected(err.to_string()),
            CryptoError::Fault(reason) => AuthError::CryptoFault(reason),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotAvailable(id) => AuthError::NotAvailable(id),
            StorageError::AlreadyExists(_) => AuthError::Rejected(err.to_string()),
            // The backing file failed underneath the store; the cause
            // stays in the logs.
            StorageError::Io(_) | StorageError::Serialization(_) => {
                AuthError::Rejected("Credential store failure".to_string())
            }
        }
    }
}
