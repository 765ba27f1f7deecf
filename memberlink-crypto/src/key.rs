//! Symmetric key handling.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use memberlink_core::constants::ENCRYPTION_KEY_SIZE;
use memberlink_core::error::{MemberlinkError, Result};

/// 256-bit key used to encrypt credentials.
///
/// Zeroized on drop. Never persisted or logged by the registry.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; ENCRYPTION_KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    /// Returns error if bytes length doesn't match `ENCRYPTION_KEY_SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENCRYPTION_KEY_SIZE {
            return Err(MemberlinkError::InvalidKey {
                expected: ENCRYPTION_KEY_SIZE,
                actual: bytes.len(),
            });
        }

        let mut arr = [0u8; ENCRYPTION_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates a key from a hex string (64 characters).
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = hex::decode(s.trim())?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Generates a new random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENCRYPTION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_SIZE] {
        &self.bytes
    }

    /// Returns the hex-encoded key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_round_trip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key.as_bytes(), parsed.as_bytes());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = EncryptionKey::from_bytes(&[1u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            MemberlinkError::InvalidKey { expected: 32, actual: 16 }
        ));
    }

    #[test]
    fn test_non_hex_rejected() {
        let err = EncryptionKey::from_hex("not-a-key").unwrap_err();
        assert!(matches!(err, MemberlinkError::Hex(_)));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(
            EncryptionKey::generate().as_bytes(),
            EncryptionKey::generate().as_bytes()
        );
    }

    #[test]
    fn test_debug_redacted() {
        let key = EncryptionKey::from_bytes(&[0xAB; 32]).unwrap();
        assert!(!format!("{:?}", key).contains("ab"));
    }
}
