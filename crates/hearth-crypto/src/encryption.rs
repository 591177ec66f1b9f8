//! Symmetric envelope encryption of protocol records.
//!
//! Records are sealed as `[tag] ++ bincode(record)` under AES-128/ECB
//! with PKCS#7 padding. The one-byte type tag is bound into the
//! plaintext so that a ciphertext sealed as one record type cannot be
//! opened as another.

use aes::Aes128;
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{CryptoError, Result};
use crate::keys::wrap_asymmetric;

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// Reserved tag for raw byte payloads (wrapped session keys and
/// credential material).
const BYTES_TAG: u8 = 0;

/// A protocol record that can be sealed into a symmetric envelope.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// One-byte type tag bound into the plaintext ahead of the record.
    const TAG: u8;
}

/// Seal a typed record under a 16-byte symmetric key.
///
/// Serialization or key-length failures are [`CryptoError::Fault`];
/// sealing never fails on well-formed input.
pub fn encrypt_symmetric<M: WireMessage>(message: &M, key: &[u8]) -> Result<Vec<u8>> {
    let record = bincode::serialize(message)
        .map_err(|err| CryptoError::Fault(format!("record serialization failed: {err}")))?;
    let mut plaintext = Vec::with_capacity(record.len() + 1);
    plaintext.push(M::TAG);
    plaintext.extend_from_slice(&record);
    encrypt_raw(&plaintext, key)
}

/// Open a sealed record, expecting the type `M`.
///
/// Any failure — wrong key, corrupted ciphertext, malformed record,
/// or a type tag other than `M::TAG` — is [`CryptoError::Rejected`].
pub fn decrypt_symmetric<M: WireMessage>(ciphertext: &[u8], key: &[u8]) -> Result<M> {
    let plaintext = decrypt_raw(ciphertext, key)?;
    let record = expect_tag(&plaintext, M::TAG)?;
    bincode::deserialize(record).map_err(|_| CryptoError::Rejected)
}

/// Seal raw bytes (a session key or credential material).
pub fn encrypt_bytes(payload: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.push(BYTES_TAG);
    plaintext.extend_from_slice(payload);
    encrypt_raw(&plaintext, key)
}

/// Open a sealed raw byte payload.
pub fn decrypt_bytes(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let plaintext = decrypt_raw(ciphertext, key)?;
    expect_tag(&plaintext, BYTES_TAG).map(<[u8]>::to_vec)
}

/// Wrap a session key for delivery to a principal.
///
/// `symmetric` selects the symmetric envelope (password-derived or
/// shared keys); otherwise the bytes are RSA-wrapped under a PKCS#1 DER
/// public key. The KDC applies both in sequence for principals that
/// carry a user password and a client public key, user first.
pub fn wrap_session_key(session_key: &[u8], wrapping_key: &[u8], symmetric: bool) -> Result<Vec<u8>> {
    if symmetric {
        encrypt_bytes(session_key, wrapping_key)
    } else {
        wrap_asymmetric(session_key, wrapping_key)
    }
}

fn encrypt_raw(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128EcbEnc::new_from_slice(key)
        .map_err(|_| CryptoError::Fault(format!("invalid symmetric key length: {}", key.len())))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn decrypt_raw(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128EcbDec::new_from_slice(key).map_err(|_| CryptoError::Rejected)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Rejected)
}

fn expect_tag(plaintext: &[u8], expected: u8) -> Result<&[u8]> {
    match plaintext.split_first() {
        Some((tag, record)) if *tag == expected => Ok(record),
        _ => Err(CryptoError::Rejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        author: String,
        body: Vec<u8>,
    }

    impl WireMessage for Note {
        const TAG: u8 = 201;
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Memo {
        author: String,
        body: Vec<u8>,
    }

    impl WireMessage for Memo {
        const TAG: u8 = 202;
    }

    fn sample() -> Note {
        Note {
            author: "alice".to_string(),
            body: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = generate_key().unwrap();
        let sealed = encrypt_symmetric(&sample(), &key).unwrap();
        let opened: Note = decrypt_symmetric(&sealed, &key).unwrap();
        assert_eq!(opened, sample());
    }

    #[test]
    fn test_open_with_wrong_key_is_rejected() {
        let sealed = encrypt_symmetric(&sample(), &generate_key().unwrap()).unwrap();
        let result: Result<Note> = decrypt_symmetric(&sealed, &generate_key().unwrap());
        assert!(matches!(result, Err(CryptoError::Rejected)));
    }

    #[test]
    fn test_open_tampered_ciphertext_is_rejected() {
        let key = generate_key().unwrap();
        let mut sealed = encrypt_symmetric(&sample(), &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        let result: Result<Note> = decrypt_symmetric(&sealed, &key);
        assert!(matches!(result, Err(CryptoError::Rejected)));
    }

    #[test]
    fn test_open_as_wrong_type_is_rejected() {
        // Note and Memo have identical field layouts; only the tag
        // separates them on the wire.
        let key = generate_key().unwrap();
        let sealed = encrypt_symmetric(&sample(), &key).unwrap();
        let result: Result<Memo> = decrypt_symmetric(&sealed, &key);
        assert!(matches!(result, Err(CryptoError::Rejected)));
    }

    #[test]
    fn test_rejection_reasons_are_indistinguishable() {
        let key = generate_key().unwrap();
        let sealed = encrypt_symmetric(&sample(), &key).unwrap();

        let wrong_key_err = decrypt_symmetric::<Note>(&sealed, &generate_key().unwrap())
            .unwrap_err()
            .to_string();
        let wrong_type_err = decrypt_symmetric::<Memo>(&sealed, &key)
            .unwrap_err()
            .to_string();
        assert_eq!(wrong_key_err, wrong_type_err);
    }

    #[test]
    fn test_bytes_round_trip() {
        let key = generate_key().unwrap();
        let payload = generate_key().unwrap();
        let sealed = encrypt_bytes(&payload, &key).unwrap();
        assert_eq!(decrypt_bytes(&sealed, &key).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_bytes_cannot_be_opened_as_record() {
        let key = generate_key().unwrap();
        let sealed = encrypt_bytes(&[0u8; 16], &key).unwrap();
        let result: Result<Note> = decrypt_symmetric(&sealed, &key);
        assert!(matches!(result, Err(CryptoError::Rejected)));
    }

    #[test]
    fn test_seal_with_bad_key_length_is_a_fault() {
        let result = encrypt_bytes(&[1, 2, 3], &[0u8; 7]);
        assert!(matches!(result, Err(CryptoError::Fault(_))));
    }

    #[test]
    fn test_symmetric_wrap_matches_bytes_envelope() {
        let key = generate_key().unwrap();
        let session_key = generate_key().unwrap();
        let wrapped = wrap_session_key(&session_key, &key, true).unwrap();
        assert_eq!(decrypt_bytes(&wrapped, &key).unwrap(), session_key.to_vec());
    }
}
