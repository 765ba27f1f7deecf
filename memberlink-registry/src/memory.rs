//! In-memory document store.
//!
//! Holds the last written document in process memory. Supports failure
//! injection and an artificial write delay so callers can exercise rollback
//! and interleaving deterministically.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use memberlink_core::error::{MemberlinkError, Result};
use memberlink_core::traits::DocumentStore;

/// Document store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Last successfully written document
    contents: RwLock<Option<Vec<u8>>>,
    /// Number of upcoming writes that fail
    failing_writes: AtomicUsize,
    /// Whether reads fail
    failing_reads: AtomicBool,
    /// Successful writes so far
    writes: AtomicU64,
    /// Suspension inserted before each write completes
    write_delay: RwLock<Option<Duration>>,
}

impl MemoryStore {
    /// Creates an empty store (reads return `None`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a document.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        *store.contents.write() = Some(bytes.into());
        store
    }

    /// Makes every write sleep for `delay` before completing.
    pub fn with_write_delay(self, delay: Duration) -> Self {
        *self.write_delay.write() = Some(delay);
        self
    }

    /// Makes the next `count` writes fail with a persistence error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes reads fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.failing_reads.store(fail, Ordering::SeqCst);
    }

    /// Returns the last successfully written document.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.read().clone()
    }

    /// Replaces the stored document directly, bypassing the write counter.
    pub fn set_contents(&self, bytes: impl Into<Vec<u8>>) {
        *self.contents.write() = Some(bytes.into());
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(MemberlinkError::persistence("injected read failure"));
        }
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let delay = *self.write_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.take_write_failure() {
            debug!("Injected write failure");
            return Err(MemberlinkError::persistence("injected write failure"));
        }

        *self.contents.write() = Some(bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store_reads_none() {
        let store = MemoryStore::new();
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.write(b"one").await.unwrap();
        store.write(b"two").await.unwrap();

        assert_eq!(store.read().await.unwrap().unwrap(), b"two");
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_write_failures_are_counted_down() {
        let store = MemoryStore::with_contents(b"seed".to_vec());
        store.fail_next_writes(2);

        assert!(store.write(b"a").await.unwrap_err().is_persistence_error());
        assert!(store.write(b"b").await.is_err());
        store.write(b"c").await.unwrap();

        assert_eq!(store.contents().unwrap(), b"c");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        assert!(store.read().await.is_err());
        store.fail_reads(false);
        assert!(store.read().await.is_ok());
    }
}
