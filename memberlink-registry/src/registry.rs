//! The member registry: transactional mutations over a [`MemberIndex`].
//!
//! Every state change follows the same shape inside one exclusive write
//! lock:
//!
//! ```text
//! lock -> check + mutate index (sync) -> encode + write document (await)
//!      -> on write failure: restore snapshot, return the adapter's error
//!      -> unlock
//! ```
//!
//! Mutations, `save` and `reload` run on a spawned task that owns a handle to
//! the shared state. Dropping the caller's future only stops it waiting for
//! the result; the operation still either persists or rolls back.
//!
//! Reads never take the write lock. They observe the index through a short
//! synchronous read guard and always return owned copies.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn, Instrument};

use memberlink_core::error::{MemberlinkError, Result};
use memberlink_core::traits::DocumentStore;
use memberlink_core::types::{Credentials, Member, ProfileSnapshot, SubjectSnapshot};
use memberlink_crypto::CredentialCipher;

use crate::audit::{audit, AuditReport};
use crate::config::RegistryConfig;
use crate::document;
use crate::file::FileStore;
use crate::index::{EntrySnapshot, MemberIndex};
use crate::loader::{load_document, Anomaly};

/// The exclusive, non-reentrant critical section shared by all mutations.
///
/// Tokio's mutex admits waiters in FIFO order. Pass the same lock to several
/// registries (or hold it in a test) to control scheduling.
pub type WriteLock = Arc<Mutex<()>>;

/// Member counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// All members
    pub total: usize,
    /// Active members
    pub active: usize,
    /// Inactive members
    pub inactive: usize,
}

/// Summary of a load from the document store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Members installed
    pub members: usize,
    /// Duplicate records dropped
    pub anomalies: Vec<Anomaly>,
    /// Whether the cleaned state was written back
    pub repaired: bool,
}

/// State owned jointly by the registry handle and its operation tasks.
struct Shared {
    index: RwLock<MemberIndex>,
    write_lock: WriteLock,
    store: Arc<dyn DocumentStore>,
    cipher: CredentialCipher,
}

/// In-memory member registry with encrypted-at-rest persistence.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct MemberRegistry {
    shared: Arc<Shared>,
}

impl MemberRegistry {
    /// Opens a registry, loading whatever document the store holds.
    pub async fn open(store: Arc<dyn DocumentStore>, cipher: CredentialCipher) -> Result<Self> {
        Self::open_with_lock(store, cipher, WriteLock::default()).await
    }

    /// Opens a registry that serializes its mutations through `write_lock`.
    pub async fn open_with_lock(
        store: Arc<dyn DocumentStore>,
        cipher: CredentialCipher,
        write_lock: WriteLock,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            index: RwLock::new(MemberIndex::new()),
            write_lock,
            store,
            cipher,
        });

        {
            let _guard = shared.write_lock.lock().await;
            shared.load_locked().await?;
        }

        Ok(Self { shared })
    }

    /// Opens a file-backed registry described by `config`.
    pub async fn open_from_config(config: &RegistryConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::new(&config.path));
        Self::open(store, CredentialCipher::new(&config.encryption_key)).await
    }

    /// Returns a handle to the write lock.
    pub fn write_lock(&self) -> WriteLock {
        Arc::clone(&self.shared.write_lock)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Links `external_account_id` to the subject in `subject` and persists.
    ///
    /// # Errors
    /// - [`MemberlinkError::DuplicateExternalAccount`] naming the existing subject
    /// - [`MemberlinkError::DuplicateSubject`] naming the existing external account
    /// - [`MemberlinkError::Persistence`] after the insert has been rolled back
    #[instrument(skip(self, subject, credentials, profile), fields(subject_id = subject.id))]
    pub async fn register(
        &self,
        external_account_id: &str,
        subject: SubjectSnapshot,
        credentials: Credentials,
        profile: ProfileSnapshot,
    ) -> Result<Member> {
        if external_account_id.trim().is_empty() {
            return Err(MemberlinkError::Validation(
                "external account id must not be empty".into(),
            ));
        }

        let external_account_id = external_account_id.to_string();
        let member = self
            .transact("register", move |index, now| {
                let member = Member::new(external_account_id, subject, credentials, profile, now);
                let undo = index.register(member.clone())?;
                Ok((member, undo))
            })
            .await?;

        info!(
            subject_id = %member.subject_id,
            external_account_id = %member.external_account_id,
            "Member registered"
        );
        Ok(member)
    }

    /// Marks a member inactive and removes its external-account mapping.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, subject_id: &str) -> Result<()> {
        let id = subject_id.to_string();
        self.transact("deactivate", move |index, now| {
            let undo = index.deactivate(&id, now)?;
            Ok(((), undo))
        })
        .await?;

        info!(subject_id, "Member deactivated");
        Ok(())
    }

    /// Marks a member active and restores its external-account mapping.
    #[instrument(skip(self))]
    pub async fn reactivate(&self, subject_id: &str) -> Result<()> {
        let id = subject_id.to_string();
        self.transact("reactivate", move |index, _now| {
            let undo = index.reactivate(&id)?;
            Ok(((), undo))
        })
        .await?;

        info!(subject_id, "Member reactivated");
        Ok(())
    }

    /// Deletes a member and its mapping.
    #[instrument(skip(self))]
    pub async fn remove(&self, subject_id: &str) -> Result<()> {
        let id = subject_id.to_string();
        self.transact("remove", move |index, _now| {
            let undo = index.remove(&id)?;
            Ok(((), undo))
        })
        .await?;

        info!(subject_id, "Member removed");
        Ok(())
    }

    /// Replaces a member's credentials and stamps `last_credential_refresh`.
    #[instrument(skip(self, credentials))]
    pub async fn refresh_credentials(&self, subject_id: &str, credentials: Credentials) -> Result<Member> {
        let id = subject_id.to_string();
        let member = self
            .transact("refresh_credentials", move |index, now| {
                index.replace_credentials(&id, credentials, now)
            })
            .await?;

        debug!(subject_id, expires_at = %member.credentials.expires_at, "Credentials refreshed");
        Ok(member)
    }

    /// Writes the current state to the store.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        self.detached(|shared| async move {
            let _guard = shared.write_lock.lock().await;
            shared.persist().await
        })
        .await
    }

    /// Reloads state from the store.
    ///
    /// On any load error the in-memory registry is left untouched.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<LoadReport> {
        self.detached(|shared| async move {
            let _guard = shared.write_lock.lock().await;
            shared.load_locked().await
        })
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns a copy of the member for `subject_id`.
    pub fn get_by_subject(&self, subject_id: &str) -> Option<Member> {
        self.shared.index.read().get(subject_id).cloned()
    }

    /// Returns a copy of the active member linked to `external_account_id`.
    pub fn get_by_external_account(&self, external_account_id: &str) -> Option<Member> {
        self.shared
            .index
            .read()
            .get_by_external_account(external_account_id)
            .cloned()
    }

    /// Returns copies of all members, oldest registration first.
    pub fn list_all(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.shared.index.read().members().cloned().collect();
        members.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.subject.id.cmp(&b.subject.id))
        });
        members
    }

    /// Returns copies of active members, oldest registration first.
    pub fn list_active(&self) -> Vec<Member> {
        let mut members = self.list_all();
        members.retain(|m| m.is_active);
        members
    }

    /// Returns true if a member exists for `subject_id`.
    pub fn contains_subject(&self, subject_id: &str) -> bool {
        self.shared.index.read().get(subject_id).is_some()
    }

    /// Returns true if an active member is linked to `external_account_id`.
    pub fn contains_external_account(&self, external_account_id: &str) -> bool {
        self.shared
            .index
            .read()
            .mapped_subject(external_account_id)
            .is_some()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.shared.index.read().len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.shared.index.read().is_empty()
    }

    /// Member counts by status.
    pub fn stats(&self) -> RegistryStats {
        let index = self.shared.index.read();
        let active = index.members().filter(|m| m.is_active).count();
        RegistryStats {
            total: index.len(),
            active,
            inactive: index.len() - active,
        }
    }

    /// Audits the index invariants.
    pub fn audit(&self) -> AuditReport {
        let report = audit(&self.shared.index.read());
        if !report.is_consistent {
            warn!(errors = report.errors.len(), "Registry audit found inconsistencies");
        }
        report
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Runs one mutation and its persistence inside the write lock, on a
    /// detached task.
    async fn transact<T, F>(&self, operation: &'static str, mutate: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MemberIndex, DateTime<Utc>) -> Result<(T, EntrySnapshot)> + Send + 'static,
    {
        self.detached(move |shared| async move { shared.transact(operation, mutate).await })
            .await
    }

    /// Spawns `task` and waits for its result.
    ///
    /// The task runs to completion even if this future is dropped.
    async fn detached<T, F, Fut>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(task(Arc::clone(&self.shared)).in_current_span());

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(MemberlinkError::Internal(format!("registry task aborted: {e}"))),
        }
    }
}

impl Shared {
    async fn transact<T, F>(&self, operation: &'static str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut MemberIndex, DateTime<Utc>) -> Result<(T, EntrySnapshot)>,
    {
        let _guard = self.write_lock.lock().await;

        let (value, undo) = {
            let mut index = self.index.write();
            mutate(&mut *index, Utc::now())?
        };

        if let Err(err) = self.persist().await {
            warn!(
                operation,
                subject_id = %undo.subject_id,
                external_account_id = %undo.external_account_id,
                error = %err,
                "Persistence failed, rolling back"
            );
            self.index.write().restore(undo);
            return Err(err);
        }

        Ok(value)
    }

    /// Encodes the settled index and writes it. Caller holds the write lock.
    async fn persist(&self) -> Result<()> {
        let bytes = {
            let index = self.index.read();
            document::encode(&index, &self.cipher, Utc::now())?
        };

        self.store.write(&bytes).await?;
        debug!(bytes = bytes.len(), store = %self.store.describe(), "Registry persisted");
        Ok(())
    }

    /// Reads and installs the stored document. Caller holds the write lock.
    async fn load_locked(&self) -> Result<LoadReport> {
        let Some(bytes) = self.store.read().await? else {
            info!(store = %self.store.describe(), "No registry document, starting empty");
            *self.index.write() = MemberIndex::new();
            return Ok(LoadReport::default());
        };

        let outcome = load_document(&bytes, &self.cipher).map_err(|e| {
            error!(store = %self.store.describe(), error = %e, "Registry load failed");
            e
        })?;

        let mut report = LoadReport {
            members: outcome.index.len(),
            anomalies: outcome.anomalies,
            repaired: false,
        };
        *self.index.write() = outcome.index;

        if !report.anomalies.is_empty() {
            match self.persist().await {
                Ok(()) => {
                    info!(dropped = report.anomalies.len(), "Saved repaired registry");
                    report.repaired = true;
                }
                Err(e) => {
                    error!(error = %e, "Failed to save repaired registry");
                }
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for MemberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberRegistry")
            .field("members", &self.len())
            .field("store", &self.shared.store.describe())
            .finish()
    }
}
