//! Key size constants.

/// Symmetric key length in bytes (AES-128).
pub const SYMMETRIC_KEY_LENGTH: usize = 16;

/// Length of a password-derived key: SHA-256 truncated to 16 bytes.
pub const HASHED_KEY_LENGTH: usize = 16;

/// Modulus size of generated RSA key pairs.
pub const RSA_KEY_BITS: usize = 2048;
