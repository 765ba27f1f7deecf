//! Bidirectional member index.
//!
//! Two maps kept in lockstep:
//!
//! ```text
//! by_subject:          subject_id          -> Member
//! by_external_account: external_account_id -> subject_id   (active members only)
//! ```
//!
//! A third map, `inactive_owners`, records which inactive member still holds
//! each unmapped external account so uniqueness checks stay O(1).
//!
//! Every mutation goes through the crate-private methods below, which return
//! an [`EntrySnapshot`] that undoes the change when passed to
//! [`MemberIndex::restore`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use memberlink_core::error::{MemberlinkError, Result};
use memberlink_core::types::{Credentials, Member};

/// Prior state of the two index entries touched by one mutation.
///
/// `None` means the entry was absent before the mutation.
#[derive(Clone, Debug)]
pub(crate) struct EntrySnapshot {
    pub(crate) subject_id: String,
    pub(crate) external_account_id: String,
    member: Option<Member>,
    mapping: Option<String>,
}

/// The registry store: members by subject plus the active-account mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemberIndex {
    by_subject: HashMap<String, Member>,
    by_external_account: HashMap<String, String>,
    inactive_owners: HashMap<String, String>,
}

impl MemberIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members, active or not.
    pub fn len(&self) -> usize {
        self.by_subject.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }

    /// Number of external-account mappings.
    pub fn mapping_count(&self) -> usize {
        self.by_external_account.len()
    }

    /// Looks up a member by subject id.
    pub fn get(&self, subject_id: &str) -> Option<&Member> {
        self.by_subject.get(subject_id)
    }

    /// Looks up an active member by external account id.
    pub fn get_by_external_account(&self, external_account_id: &str) -> Option<&Member> {
        self.by_external_account
            .get(external_account_id)
            .and_then(|subject_id| self.by_subject.get(subject_id))
    }

    /// Iterates over all members in arbitrary order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.by_subject.values()
    }

    /// Iterates over `(external_account_id, subject_id)` mappings.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_external_account
            .iter()
            .map(|(ext, subject)| (ext.as_str(), subject.as_str()))
    }

    /// Returns the subject id an active external account maps to.
    pub fn mapped_subject(&self, external_account_id: &str) -> Option<&str> {
        self.by_external_account
            .get(external_account_id)
            .map(String::as_str)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Captures the current state of both entries for one member.
    pub(crate) fn snapshot(&self, subject_id: &str, external_account_id: &str) -> EntrySnapshot {
        EntrySnapshot {
            subject_id: subject_id.to_string(),
            external_account_id: external_account_id.to_string(),
            member: self.by_subject.get(subject_id).cloned(),
            mapping: self.by_external_account.get(external_account_id).cloned(),
        }
    }

    /// Puts both entries back exactly as captured.
    pub(crate) fn restore(&mut self, snapshot: EntrySnapshot) {
        let EntrySnapshot {
            subject_id,
            external_account_id,
            member,
            mapping,
        } = snapshot;

        // Drop whatever the mutation recorded before reinstating the member
        if let Some(current) = self.by_subject.get(&subject_id) {
            let current_account = current.external_account_id.clone();
            self.forget_inactive_owner(&current_account, &subject_id);
        }

        match member {
            Some(member) => {
                if !member.is_active {
                    self.inactive_owners
                        .insert(member.external_account_id.clone(), subject_id.clone());
                }
                self.by_subject.insert(subject_id, member);
            }
            None => {
                self.by_subject.remove(&subject_id);
            }
        }
        match mapping {
            Some(mapped) => {
                self.by_external_account.insert(external_account_id, mapped);
            }
            None => {
                self.by_external_account.remove(&external_account_id);
            }
        }
    }

    /// Inserts a member without uniqueness checks.
    ///
    /// The mapping is written only for active members. Used by the loader,
    /// which performs its own duplicate detection.
    pub(crate) fn insert(&mut self, member: Member) {
        if member.is_active {
            self.by_external_account
                .insert(member.external_account_id.clone(), member.subject_id.clone());
        } else {
            self.inactive_owners
                .insert(member.external_account_id.clone(), member.subject_id.clone());
        }
        self.by_subject.insert(member.subject_id.clone(), member);
    }

    /// Inserts a new member after checking both keys are free.
    pub(crate) fn register(&mut self, member: Member) -> Result<EntrySnapshot> {
        if let Some(existing) = self.owner_of_external_account(&member.external_account_id) {
            return Err(MemberlinkError::DuplicateExternalAccount {
                external_account_id: member.external_account_id.clone(),
                existing_subject_id: existing.to_string(),
            });
        }
        if let Some(existing) = self.by_subject.get(&member.subject_id) {
            return Err(MemberlinkError::DuplicateSubject {
                subject_id: member.subject_id.clone(),
                existing_external_account_id: existing.external_account_id.clone(),
            });
        }

        let snapshot = self.snapshot(&member.subject_id, &member.external_account_id);
        self.insert(member);
        Ok(snapshot)
    }

    /// Marks a member inactive and drops its mapping.
    pub(crate) fn deactivate(&mut self, subject_id: &str, now: DateTime<Utc>) -> Result<EntrySnapshot> {
        let snapshot = self.snapshot_existing(subject_id)?;
        if let Some(member) = self.by_subject.get_mut(subject_id) {
            member.is_active = false;
            member.deactivated_at = Some(now);
        }
        self.by_external_account.remove(&snapshot.external_account_id);
        self.inactive_owners
            .insert(snapshot.external_account_id.clone(), subject_id.to_string());
        Ok(snapshot)
    }

    /// Marks a member active and restores its mapping.
    pub(crate) fn reactivate(&mut self, subject_id: &str) -> Result<EntrySnapshot> {
        let snapshot = self.snapshot_existing(subject_id)?;
        if let Some(other) = snapshot.mapping.as_deref().filter(|s| *s != subject_id) {
            return Err(MemberlinkError::DuplicateExternalAccount {
                external_account_id: snapshot.external_account_id.clone(),
                existing_subject_id: other.to_string(),
            });
        }

        if let Some(member) = self.by_subject.get_mut(subject_id) {
            member.is_active = true;
            member.deactivated_at = None;
        }
        self.forget_inactive_owner(&snapshot.external_account_id, subject_id);
        self.by_external_account
            .insert(snapshot.external_account_id.clone(), subject_id.to_string());
        Ok(snapshot)
    }

    /// Deletes a member and its mapping.
    pub(crate) fn remove(&mut self, subject_id: &str) -> Result<EntrySnapshot> {
        let snapshot = self.snapshot_existing(subject_id)?;
        self.by_subject.remove(subject_id);
        self.forget_inactive_owner(&snapshot.external_account_id, subject_id);
        if snapshot.mapping.as_deref() == Some(subject_id) {
            self.by_external_account.remove(&snapshot.external_account_id);
        }
        Ok(snapshot)
    }

    /// Replaces a member's credentials and stamps the refresh time.
    pub(crate) fn replace_credentials(
        &mut self,
        subject_id: &str,
        credentials: Credentials,
        now: DateTime<Utc>,
    ) -> Result<(Member, EntrySnapshot)> {
        let snapshot = self.snapshot_existing(subject_id)?;
        let member = self
            .by_subject
            .get_mut(subject_id)
            .ok_or_else(|| MemberlinkError::NotFound(subject_id.to_string()))?;
        member.credentials = credentials;
        member.last_credential_refresh = now;
        Ok((member.clone(), snapshot))
    }

    fn snapshot_existing(&self, subject_id: &str) -> Result<EntrySnapshot> {
        let member = self
            .by_subject
            .get(subject_id)
            .ok_or_else(|| MemberlinkError::NotFound(subject_id.to_string()))?;
        Ok(self.snapshot(subject_id, &member.external_account_id))
    }

    /// Finds the member holding an external account, active or not.
    fn owner_of_external_account(&self, external_account_id: &str) -> Option<&str> {
        self.by_external_account
            .get(external_account_id)
            .or_else(|| self.inactive_owners.get(external_account_id))
            .map(String::as_str)
    }

    fn forget_inactive_owner(&mut self, external_account_id: &str, subject_id: &str) {
        if self.inactive_owners.get(external_account_id).map(String::as_str) == Some(subject_id) {
            self.inactive_owners.remove(external_account_id);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TEST HOOKS
    // ═══════════════════════════════════════════════════════════════════════════

    #[cfg(test)]
    pub(crate) fn force_mapping(&mut self, external_account_id: &str, subject_id: &str) {
        self.by_external_account
            .insert(external_account_id.to_string(), subject_id.to_string());
    }

    #[cfg(test)]
    pub(crate) fn force_unmap(&mut self, external_account_id: &str) {
        self.by_external_account.remove(external_account_id);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use memberlink_core::types::{ProfileSnapshot, SubjectSnapshot};

    pub(crate) fn member(ext: &str, subject: u64) -> Member {
        let now = Utc::now();
        Member::new(
            ext,
            SubjectSnapshot::new(subject).with_field("firstname", format!("Rider {subject}")),
            Credentials::bearer(format!("access-{subject}"), format!("refresh-{subject}"), now),
            ProfileSnapshot::default(),
            now,
        )
    }

    #[test]
    fn test_register_populates_both_maps() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.mapping_count(), 1);
        assert_eq!(index.mapped_subject("ext-1"), Some("100"));
        assert_eq!(index.get_by_external_account("ext-1").unwrap().subject_id, "100");
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();

        let err = index.register(member("ext-1", 200)).unwrap_err();
        assert!(matches!(
            err,
            MemberlinkError::DuplicateExternalAccount { ref existing_subject_id, .. } if existing_subject_id == "100"
        ));

        let err = index.register(member("ext-2", 100)).unwrap_err();
        assert!(matches!(
            err,
            MemberlinkError::DuplicateSubject { ref existing_external_account_id, .. } if existing_external_account_id == "ext-1"
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_inactive_member_still_owns_external_account() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.deactivate("100", Utc::now()).unwrap();

        let err = index.register(member("ext-1", 200)).unwrap_err();
        assert!(matches!(err, MemberlinkError::DuplicateExternalAccount { .. }));
    }

    #[test]
    fn test_inactive_ownership_released_on_remove() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.deactivate("100", Utc::now()).unwrap();
        index.remove("100").unwrap();

        index.register(member("ext-1", 200)).unwrap();
        assert_eq!(index.mapped_subject("ext-1"), Some("200"));
    }

    #[test]
    fn test_inactive_ownership_survives_reactivate_cycle() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.deactivate("100", Utc::now()).unwrap();
        index.reactivate("100").unwrap();
        index.deactivate("100", Utc::now()).unwrap();

        match index.register(member("ext-1", 200)).unwrap_err() {
            MemberlinkError::DuplicateExternalAccount { existing_subject_id, .. } => {
                assert_eq!(existing_subject_id, "100")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rolled_back_remove_keeps_inactive_ownership() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.deactivate("100", Utc::now()).unwrap();

        let undo = index.remove("100").unwrap();
        index.restore(undo);

        assert!(matches!(
            index.register(member("ext-1", 200)),
            Err(MemberlinkError::DuplicateExternalAccount { .. })
        ));
    }

    #[test]
    fn test_loaded_inactive_member_owns_external_account() {
        let mut index = MemberIndex::new();
        let mut m = member("ext-1", 100);
        m.is_active = false;
        index.insert(m);

        assert!(matches!(
            index.register(member("ext-1", 200)),
            Err(MemberlinkError::DuplicateExternalAccount { .. })
        ));
    }

    #[test]
    fn test_deactivate_and_reactivate_toggle_mapping() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();

        index.deactivate("100", Utc::now()).unwrap();
        let m = index.get("100").unwrap();
        assert!(!m.is_active);
        assert!(m.deactivated_at.is_some());
        assert_eq!(index.mapping_count(), 0);
        assert!(index.get_by_external_account("ext-1").is_none());

        index.reactivate("100").unwrap();
        let m = index.get("100").unwrap();
        assert!(m.is_active);
        assert!(m.deactivated_at.is_none());
        assert_eq!(index.mapped_subject("ext-1"), Some("100"));
    }

    #[test]
    fn test_missing_subject_is_not_found() {
        let mut index = MemberIndex::new();
        assert!(matches!(index.deactivate("1", Utc::now()), Err(MemberlinkError::NotFound(_))));
        assert!(matches!(index.reactivate("1"), Err(MemberlinkError::NotFound(_))));
        assert!(matches!(index.remove("1"), Err(MemberlinkError::NotFound(_))));
    }

    #[test]
    fn test_restore_undoes_every_mutation() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.register(member("ext-2", 200)).unwrap();
        index.deactivate("200", Utc::now()).unwrap();
        let before = index.clone();

        let undo = index.register(member("ext-3", 300)).unwrap();
        index.restore(undo);
        assert_eq!(index, before);

        let undo = index.deactivate("100", Utc::now()).unwrap();
        index.restore(undo);
        assert_eq!(index, before);

        let undo = index.reactivate("200").unwrap();
        index.restore(undo);
        assert_eq!(index, before);

        let undo = index.remove("100").unwrap();
        index.restore(undo);
        assert_eq!(index, before);

        let fresh = Credentials::bearer("new", "new", Utc::now());
        let (_, undo) = index.replace_credentials("100", fresh, Utc::now()).unwrap();
        index.restore(undo);
        assert_eq!(index, before);
    }

    #[test]
    fn test_insert_skips_mapping_for_inactive() {
        let mut index = MemberIndex::new();
        let mut m = member("ext-1", 100);
        m.is_active = false;
        index.insert(m);
        assert_eq!(index.len(), 1);
        assert_eq!(index.mapping_count(), 0);
    }
}
