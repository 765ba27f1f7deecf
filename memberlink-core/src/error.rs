//! Error types for memberlink.
//!
//! This module provides the full error taxonomy using `thiserror`.
//! Registry errors name the conflicting entry so callers can act on them.

use thiserror::Error;

/// Result type alias using `MemberlinkError`.
pub type Result<T> = std::result::Result<T, MemberlinkError>;

/// Main error type for all memberlink operations.
#[derive(Debug, Error)]
pub enum MemberlinkError {
    // ═══════════════════════════════════════════════════════════════════════════
    // REGISTRY ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The external account is already linked to a subject.
    #[error("External account {external_account_id} is already registered to subject {existing_subject_id}")]
    DuplicateExternalAccount {
        /// External account that was being registered
        external_account_id: String,
        /// Subject the account is already linked to
        existing_subject_id: String,
    },

    /// The subject is already linked to an external account.
    #[error("Subject {subject_id} is already registered to external account {existing_external_account_id}")]
    DuplicateSubject {
        /// Subject that was being registered
        subject_id: String,
        /// External account the subject is already linked to
        existing_external_account_id: String,
    },

    /// No member exists for the subject.
    #[error("Member not found: {0}")]
    NotFound(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // LOAD ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A persisted record failed structural validation.
    #[error("Invalid record at index {index}: {reason}")]
    LoadValidation {
        /// Position of the record in the `members` array
        index: usize,
        /// Human-readable reason
        reason: String,
    },

    /// The persisted document as a whole is unreadable.
    #[error("Corrupt registry document: {0}")]
    CorruptDocument(String),

    /// Persisted document version is not supported.
    #[error("Document version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Supported version
        expected: String,
        /// Version found in the document
        actual: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // CRYPTOGRAPHIC ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credentials could not be decrypted (tampered, corrupted, or malformed).
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Credentials could not be encrypted.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Invalid encryption key size.
    #[error("Invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey {
        /// Required key length
        expected: usize,
        /// Supplied key length
        actual: usize,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The persistence adapter failed. The underlying error is carried unchanged.
    #[error(transparent)]
    Persistence(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MemberlinkError {
    /// Returns true if the caller can correct the request and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MemberlinkError::DuplicateExternalAccount { .. }
                | MemberlinkError::DuplicateSubject { .. }
                | MemberlinkError::NotFound(_)
                | MemberlinkError::Validation(_)
        )
    }

    /// Returns true if this error aborts a load attempt.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            MemberlinkError::LoadValidation { .. }
                | MemberlinkError::CorruptDocument(_)
                | MemberlinkError::VersionMismatch { .. }
                | MemberlinkError::Decryption(_)
        )
    }

    /// Returns true if this error came from the persistence adapter.
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, MemberlinkError::Persistence(_))
    }

    /// Builds a persistence error from any message.
    pub fn persistence(message: impl Into<String>) -> Self {
        MemberlinkError::Persistence(std::io::Error::new(
            std::io::ErrorKind::Other,
            message.into(),
        ))
    }
}
