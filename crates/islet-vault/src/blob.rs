//! The at-rest blob format: AES-256-GCM over the serialized credential
//! list, with base64 fields.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Current blob format version.
pub const BLOB_VERSION: u32 = 1;

/// GCM nonce length in bytes (96 bits).
const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// The on-disk representation of the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultBlob {
    /// Format version.
    pub version: u32,
    /// Random 96-bit nonce, base64.
    pub iv: String,
    /// GCM authentication tag, base64.
    pub tag: String,
    /// Ciphertext, base64.
    pub data: String,
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if encryption fails.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> VaultResult<VaultBlob> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| VaultError::Crypto(e.to_string()))?;

    // AEAD output is ciphertext || tag; the blob stores them separately.
    let tag = sealed.split_off(sealed.len().saturating_sub(TAG_LEN));
    Ok(VaultBlob {
        version: BLOB_VERSION,
        iv: BASE64.encode(iv),
        tag: BASE64.encode(tag),
        data: BASE64.encode(sealed),
    })
}

/// Decrypt a blob under `key`.
///
/// # Errors
///
/// Fails on version mismatch, malformed base64, or authentication
/// failure (wrong key or tampered data).
pub fn open(key: &[u8; 32], blob: &VaultBlob) -> VaultResult<Vec<u8>> {
    if blob.version != BLOB_VERSION {
        return Err(VaultError::UnsupportedVersion(blob.version));
    }
    let iv = BASE64
        .decode(&blob.iv)
        .map_err(|e| VaultError::MalformedBlob(format!("iv: {e}")))?;
    if iv.len() != IV_LEN {
        return Err(VaultError::MalformedBlob(format!(
            "iv length {} (expected {IV_LEN})",
            iv.len()
        )));
    }
    let tag = BASE64
        .decode(&blob.tag)
        .map_err(|e| VaultError::MalformedBlob(format!("tag: {e}")))?;
    let mut combined = BASE64
        .decode(&blob.data)
        .map_err(|e| VaultError::MalformedBlob(format!("data: {e}")))?;
    combined.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&iv), combined.as_slice())
        .map_err(|_| VaultError::Crypto("authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let k = key();
        let blob = seal(&k, b"the credential list").unwrap();
        assert_eq!(blob.version, BLOB_VERSION);
        let plain = open(&k, &blob).unwrap();
        assert_eq!(plain, b"the credential list");
    }

    #[test]
    fn test_wrong_key_fails_auth() {
        let blob = seal(&key(), b"secret").unwrap();
        assert!(matches!(
            open(&key(), &blob),
            Err(VaultError::Crypto(_))
        ));
    }

    #[test]
    fn test_tampered_data_fails_auth() {
        let k = key();
        let mut blob = seal(&k, b"secret").unwrap();
        let mut raw = BASE64.decode(&blob.data).unwrap();
        if let Some(byte) = raw.first_mut() {
            *byte ^= 0xff;
        }
        blob.data = BASE64.encode(raw);
        assert!(open(&k, &blob).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let k = key();
        let a = seal(&k, b"same").unwrap();
        let b = seal(&k, b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }
}
