//! Key generation and asymmetric session-key wrapping.

use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::constants::{RSA_KEY_BITS, SYMMETRIC_KEY_LENGTH};
use crate::errors::{CryptoError, Result};

/// Generate a fresh 128-bit symmetric key from the system CSPRNG.
///
/// RNG failure is a [`CryptoError::Fault`]; there is no recovery from a
/// broken entropy source.
pub fn generate_key() -> Result<[u8; SYMMETRIC_KEY_LENGTH]> {
    let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
    rand::thread_rng()
        .try_fill_bytes(&mut key)
        .map_err(|err| CryptoError::Fault(format!("random generation failed: {err}")))?;
    Ok(key)
}

/// RSA key pair backing a service-server identity.
///
/// The public half is stored in the credential store in PKCS#1 DER
/// form; the private half is written to a 0600-permissioned file by
/// the controller.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a new 2048-bit key pair.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|err| CryptoError::Fault(format!("RSA key generation failed: {err}")))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Reconstruct a key pair from PKCS#1 DER private key bytes.
    pub fn from_private_key_der(der: &[u8]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_der(der).map_err(|_| CryptoError::Rejected)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Public key in PKCS#1 DER form.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.public_key
            .to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|err| CryptoError::Fault(format!("public key encoding failed: {err}")))
    }

    /// Private key in PKCS#1 DER form.
    pub fn private_key_der(&self) -> Result<Vec<u8>> {
        self.private_key
            .to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|err| CryptoError::Fault(format!("private key encoding failed: {err}")))
    }

    /// Unwrap bytes that were wrapped under this pair's public key.
    ///
    /// Failures are [`CryptoError::Rejected`], indistinguishable by
    /// cause.
    pub fn unwrap(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::Rejected)
    }
}

/// RSA-wrap a payload under a PKCS#1 DER public key.
pub fn wrap_asymmetric(payload: &[u8], public_key_der: &[u8]) -> Result<Vec<u8>> {
    let public_key = RsaPublicKey::from_pkcs1_der(public_key_der)
        .map_err(|err| CryptoError::Fault(format!("invalid public wrapping key: {err}")))?;
    let mut rng = rand::thread_rng();
    public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, payload)
        .map_err(|err| CryptoError::Fault(format!("asymmetric wrap failed: {err}")))
}
