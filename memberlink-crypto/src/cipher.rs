//! AES-256-GCM codec for the credential sub-record.
//!
//! The plaintext is the JSON form of [`Credentials`]. The ciphertext, IV and
//! tag are stored separately as lowercase hex:
//!
//! ```text
//! cipherBlob = AES-256-GCM(key, iv, json(credentials))   (tag detached)
//! iv         = 12 random bytes, fresh per call
//! authTag    = 16-byte GCM tag
//! ```

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes256Gcm;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use memberlink_core::constants::{AUTH_TAG_SIZE, IV_SIZE};
use memberlink_core::error::{MemberlinkError, Result};
use memberlink_core::types::{Credentials, EncryptedCredentials};

use crate::key::EncryptionKey;

/// Encrypts and decrypts member credentials with one fixed key.
#[derive(Clone)]
pub struct CredentialCipher {
    aead: Aes256Gcm,
}

impl CredentialCipher {
    /// Creates a cipher keyed by `key`.
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            aead: Aes256Gcm::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// Encrypts credentials under a fresh random IV.
    pub fn encrypt(&self, credentials: &Credentials) -> Result<EncryptedCredentials> {
        let mut buffer = Zeroizing::new(serde_json::to_vec(credentials)?);

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let tag = self
            .aead
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", buffer.as_mut_slice())
            .map_err(|e| MemberlinkError::Encryption(e.to_string()))?;

        Ok(EncryptedCredentials {
            cipher_blob: hex::encode(buffer.as_slice()),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag.as_slice()),
        })
    }

    /// Decrypts and authenticates credentials.
    ///
    /// # Errors
    /// Returns [`MemberlinkError::Decryption`] if any field is not hex, the IV
    /// or tag has the wrong length, the tag does not verify, or the plaintext
    /// is not a credential record.
    pub fn decrypt(&self, sealed: &EncryptedCredentials) -> Result<Credentials> {
        let iv = decode_exact("iv", &sealed.iv, IV_SIZE)?;
        let tag = decode_exact("authTag", &sealed.auth_tag, AUTH_TAG_SIZE)?;
        let mut buffer = Zeroizing::new(
            hex::decode(&sealed.cipher_blob)
                .map_err(|e| MemberlinkError::Decryption(format!("cipherBlob is not hex: {e}")))?,
        );

        self.aead
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                buffer.as_mut_slice(),
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| MemberlinkError::Decryption("authentication tag mismatch".into()))?;

        serde_json::from_slice(buffer.as_slice()).map_err(|e| {
            MemberlinkError::Decryption(format!("plaintext is not a credential record: {e}"))
        })
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(AES-256-GCM)")
    }
}

/// Decodes a hex field that must be exactly `len` bytes.
fn decode_exact(field: &str, value: &str, len: usize) -> Result<Vec<u8>> {
    let bytes = hex::decode(value)
        .map_err(|e| MemberlinkError::Decryption(format!("{field} is not hex: {e}")))?;
    if bytes.len() != len {
        return Err(MemberlinkError::Decryption(format!(
            "{field} must be {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
