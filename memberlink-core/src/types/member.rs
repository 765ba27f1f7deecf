//! Member types for the registry.
//!
//! A member links one external account (the party that registered) to one
//! subject (the resource on the external service, identified numerically).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::Credentials;

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Profile of the registering external account (display name, avatar, ...).
///
/// Copied verbatim at registration and never re-validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Opaque profile fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ProfileSnapshot {
    /// Creates a profile snapshot from opaque fields.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns a string field, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Profile of the linked subject on the external service.
///
/// The numeric `id` is the only field the registry interprets; it becomes the
/// member's primary key in string form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    /// Numeric identity of the subject
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    /// Opaque remaining fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SubjectSnapshot {
    /// Creates a snapshot with no extra fields.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Adds an opaque field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the registry key for this subject.
    pub fn subject_id(&self) -> String {
        self.id.to_string()
    }
}

/// Accepts an unsigned integer or a string of decimal digits.
fn numeric_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("subject id out of range: {s}"))),
        Repr::Text(s) => Err(serde::de::Error::custom(format!(
            "subject id must be numeric, got {s:?}"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBER
// ═══════════════════════════════════════════════════════════════════════════════

/// One linked identity pair held by the registry.
///
/// Values handed out by the registry are copies; mutating them has no effect
/// on registry state.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    /// Identity of the registering party (immutable once registered)
    pub external_account_id: String,
    /// String form of `subject.id`; primary key of the registry
    pub subject_id: String,
    /// Registering party's profile
    pub profile: ProfileSnapshot,
    /// Linked subject's profile
    pub subject: SubjectSnapshot,
    /// Current credential set
    pub credentials: Credentials,
    /// When the member was registered
    pub registered_at: DateTime<Utc>,
    /// When credentials were last replaced
    pub last_credential_refresh: DateTime<Utc>,
    /// Whether the member is active
    pub is_active: bool,
    /// Set only while the member is inactive
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Member {
    /// Creates a freshly registered, active member.
    pub fn new(
        external_account_id: impl Into<String>,
        subject: SubjectSnapshot,
        credentials: Credentials,
        profile: ProfileSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            external_account_id: external_account_id.into(),
            subject_id: subject.subject_id(),
            profile,
            subject,
            credentials,
            registered_at: now,
            last_credential_refresh: now,
            is_active: true,
            deactivated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_id_from_number_or_digit_string() {
        let s: SubjectSnapshot = serde_json::from_value(json!({"id": 42, "firstname": "Ada"})).unwrap();
        assert_eq!(s.subject_id(), "42");
        assert_eq!(s.fields["firstname"], "Ada");

        let s: SubjectSnapshot = serde_json::from_value(json!({"id": "42"})).unwrap();
        assert_eq!(s.id, 42);
    }

    #[test]
    fn test_subject_id_rejects_non_numeric() {
        assert!(serde_json::from_value::<SubjectSnapshot>(json!({"id": "abc"})).is_err());
        assert!(serde_json::from_value::<SubjectSnapshot>(json!({"id": ""})).is_err());
        assert!(serde_json::from_value::<SubjectSnapshot>(json!({"id": -5})).is_err());
        assert!(serde_json::from_value::<SubjectSnapshot>(json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_snapshot_fields_round_trip_flat() {
        let s = SubjectSnapshot::new(7).with_field("city", "Oslo");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json, json!({"id": 7, "city": "Oslo"}));
    }

    #[test]
    fn test_new_member_is_active() {
        let now = Utc::now();
        let m = Member::new(
            "ext-1",
            SubjectSnapshot::new(99),
            Credentials::bearer("a", "r", now),
            ProfileSnapshot::default(),
            now,
        );
        assert_eq!(m.subject_id, "99");
        assert!(m.is_active);
        assert!(m.deactivated_at.is_none());
        assert_eq!(m.registered_at, m.last_credential_refresh);
    }
}
