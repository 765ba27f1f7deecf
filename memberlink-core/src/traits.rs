//! Common traits for memberlink.
//!
//! These traits define the I/O boundaries the registry depends on,
//! enabling alternative backends and failure injection in tests.

use async_trait::async_trait;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable storage for the registry document.
///
/// The registry treats implementations as a black box with
/// "last successful write wins" semantics: `read` returns the bytes of the
/// most recent completed `write`.
///
/// Implementations might use:
/// - A local file (atomic replace)
/// - An object store bucket
/// - An embedded database row
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the current document.
    ///
    /// Returns `Ok(None)` when no document has ever been written.
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replaces the document with `bytes`.
    ///
    /// Failures are reported as [`MemberlinkError::Persistence`](crate::MemberlinkError::Persistence).
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Human-readable location, used in log fields.
    fn describe(&self) -> String;
}
