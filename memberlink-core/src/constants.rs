//! Constants for the memberlink registry.
//!
//! Cipher sizes follow AES-256-GCM with the standard 96-bit nonce.

// ═══════════════════════════════════════════════════════════════════════════════
// AES-256-GCM SIZES
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of the symmetric credential encryption key in bytes.
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Size of the per-record initialization vector in bytes.
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const AUTH_TAG_SIZE: usize = 16;

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Version string written to, and required from, every persisted document.
pub const DOCUMENT_VERSION: &str = "1.0";

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Environment variable holding the registry document path.
pub const ENV_REGISTRY_PATH: &str = "MEMBERLINK_REGISTRY_PATH";

/// Environment variable holding the hex-encoded encryption key.
pub const ENV_ENCRYPTION_KEY: &str = "MEMBERLINK_ENCRYPTION_KEY";

/// Registry document path used when none is configured.
pub const DEFAULT_REGISTRY_PATH: &str = "data/members.json";
