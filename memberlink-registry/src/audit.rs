//! Read-only consistency audit of a [`MemberIndex`].
//!
//! One pass over the members and one pass over the mappings; every check is
//! a hash lookup, so the cost is O(members + mappings).

use serde::Serialize;

use crate::index::MemberIndex;

/// One invariant violation found by [`audit`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditIssue {
    /// An active member whose mapping is absent or points elsewhere.
    MissingOrIncorrectMapping {
        /// The active member
        subject_id: String,
        /// Its external account
        external_account_id: String,
        /// Where the mapping points instead, if anywhere
        mapped_subject_id: Option<String>,
    },
    /// A mapping that resolves to an inactive member.
    InactiveMemberMapped {
        /// Mapped external account
        external_account_id: String,
        /// Inactive target
        subject_id: String,
    },
    /// A mapping whose target subject does not exist.
    #[serde(rename = "orphaned_discord_mapping")]
    OrphanedMapping {
        /// Mapped external account
        external_account_id: String,
        /// Missing target
        subject_id: String,
    },
}

impl AuditIssue {
    /// Stable name of the issue kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditIssue::MissingOrIncorrectMapping { .. } => "missing_or_incorrect_mapping",
            AuditIssue::InactiveMemberMapped { .. } => "inactive_member_mapped",
            AuditIssue::OrphanedMapping { .. } => "orphaned_discord_mapping",
        }
    }
}

impl std::fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditIssue::MissingOrIncorrectMapping {
                subject_id,
                external_account_id,
                mapped_subject_id: Some(other),
            } => write!(
                f,
                "{}: active subject {subject_id} ({external_account_id}) is mapped to {other}",
                self.kind()
            ),
            AuditIssue::MissingOrIncorrectMapping {
                subject_id,
                external_account_id,
                mapped_subject_id: None,
            } => write!(
                f,
                "{}: active subject {subject_id} has no mapping for {external_account_id}",
                self.kind()
            ),
            AuditIssue::InactiveMemberMapped {
                external_account_id,
                subject_id,
            } => write!(
                f,
                "{}: {external_account_id} maps to inactive subject {subject_id}",
                self.kind()
            ),
            AuditIssue::OrphanedMapping {
                external_account_id,
                subject_id,
            } => write!(
                f,
                "{}: {external_account_id} maps to unknown subject {subject_id}",
                self.kind()
            ),
        }
    }
}

/// Outcome of an audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// True iff `errors` is empty
    pub is_consistent: bool,
    /// Every violation found
    pub errors: Vec<AuditIssue>,
    /// Members inspected
    pub member_count: usize,
    /// Mappings inspected
    pub mapping_count: usize,
}

/// Checks the index invariants without mutating anything.
pub fn audit(index: &MemberIndex) -> AuditReport {
    let mut errors = Vec::new();

    for member in index.members().filter(|m| m.is_active) {
        let mapped = index.mapped_subject(&member.external_account_id);
        if mapped != Some(member.subject_id.as_str()) {
            errors.push(AuditIssue::MissingOrIncorrectMapping {
                subject_id: member.subject_id.clone(),
                external_account_id: member.external_account_id.clone(),
                mapped_subject_id: mapped.map(str::to_string),
            });
        }
    }

    for (external_account_id, subject_id) in index.mappings() {
        match index.get(subject_id) {
            None => errors.push(AuditIssue::OrphanedMapping {
                external_account_id: external_account_id.to_string(),
                subject_id: subject_id.to_string(),
            }),
            Some(member) if !member.is_active => errors.push(AuditIssue::InactiveMemberMapped {
                external_account_id: external_account_id.to_string(),
                subject_id: subject_id.to_string(),
            }),
            Some(_) => {}
        }
    }

    AuditReport {
        is_consistent: errors.is_empty(),
        errors,
        member_count: index.len(),
        mapping_count: index.mapping_count(),
    }
}
