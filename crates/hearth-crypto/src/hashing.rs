//! Password-to-key derivation.

use sha2::{Digest, Sha256};

use crate::constants::HASHED_KEY_LENGTH;

/// Derive a 16-byte symmetric key from a password.
///
/// UTF-8 encodes the password, hashes it with SHA-256 and truncates the
/// digest to the first 16 bytes. This matches the legacy credential
/// derivation exactly; it carries no salt and no work factor, which is
/// a known weakness kept for wire compatibility.
pub fn hash_password(password: &str) -> [u8; HASHED_KEY_LENGTH] {
    let digest = Sha256::digest(password.as_bytes());
    let mut key = [0u8; HASHED_KEY_LENGTH];
    key.copy_from_slice(&digest[..HASHED_KEY_LENGTH]);
    key
}
