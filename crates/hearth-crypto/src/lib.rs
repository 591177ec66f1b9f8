//! # hearth-crypto
//!
//! Cryptographic primitives for the hearth authentication service.
//!
//! Provides the symmetric envelope used to seal protocol records
//! (AES-128/ECB with PKCS#7 padding, matching the legacy wire format),
//! the password-to-key derivation (truncated SHA-256), 128-bit session
//! key generation, and the RSA key pairs that bootstrap service-server
//! identities.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod encryption;
pub mod errors;
pub mod hashing;
pub mod keys;

pub use constants::*;
pub use encryption::*;
pub use errors::CryptoError;
pub use hashing::*;
pub use keys::*;
