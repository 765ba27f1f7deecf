//! Registry configuration: document path and encryption key.

use std::path::{Path, PathBuf};

use memberlink_core::constants::{DEFAULT_REGISTRY_PATH, ENV_ENCRYPTION_KEY, ENV_REGISTRY_PATH};
use memberlink_core::error::{MemberlinkError, Result};
use memberlink_crypto::EncryptionKey;

/// Settings needed to open a file-backed registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Location of the registry document
    pub path: PathBuf,
    /// Key sealing member credentials
    pub encryption_key: EncryptionKey,
}

impl RegistryConfig {
    /// Creates a configuration from explicit values.
    pub fn new(path: impl AsRef<Path>, encryption_key: EncryptionKey) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            encryption_key,
        }
    }

    /// Reads configuration from the environment (and `.env`, if present).
    ///
    /// `MEMBERLINK_ENCRYPTION_KEY` is required; `MEMBERLINK_REGISTRY_PATH`
    /// defaults to `data/members.json`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(ENV_REGISTRY_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_REGISTRY_PATH));

        let key_hex = std::env::var(ENV_ENCRYPTION_KEY)
            .map_err(|_| MemberlinkError::Config(format!("{ENV_ENCRYPTION_KEY} is not set")))?;

        Ok(Self {
            path,
            encryption_key: EncryptionKey::from_hex(&key_hex)?,
        })
    }

    /// Overrides the document path.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Overrides the encryption key.
    pub fn with_key(mut self, encryption_key: EncryptionKey) -> Self {
        self.encryption_key = encryption_key;
        self
    }
}
