//! # Memberlink Cryptography
//!
//! Encryption at rest for the sensitive credential sub-record of each member.
//!
//! This crate provides:
//!
//! - **Key**: The fixed-length symmetric secret supplied at process start
//! - **Cipher**: AES-256-GCM encrypt/decrypt of [`Credentials`](memberlink_core::Credentials)
//!
//! ## Security Properties
//!
//! - A fresh random 96-bit IV for every encryption
//! - The tag is verified before any plaintext is parsed
//! - Keys and intermediate plaintext buffers are zeroized
//!
//! ## Example
//!
//! ```rust,ignore
//! use memberlink_crypto::{CredentialCipher, EncryptionKey};
//!
//! let key = EncryptionKey::from_hex(&std::env::var("MEMBERLINK_ENCRYPTION_KEY")?)?;
//! let cipher = CredentialCipher::new(&key);
//!
//! let sealed = cipher.encrypt(&credentials)?;
//! let opened = cipher.decrypt(&sealed)?;
//! assert_eq!(opened, credentials);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cipher;
pub mod key;

// Re-export main types at crate root
pub use cipher::CredentialCipher;
pub use key::EncryptionKey;
