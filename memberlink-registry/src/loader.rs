//! Loads a persisted document into a fresh [`MemberIndex`].
//!
//! Each raw record is classified before anything is inserted:
//!
//! 1. Structural validation: invalid records abort the whole load.
//! 2. Credential decryption: failures abort the whole load.
//! 3. Duplicate detection: a record whose external account or subject was
//!    already accepted is dropped and reported as an [`Anomaly`].
//!
//! Nothing is installed on failure; the caller receives either a complete
//! index or an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use memberlink_core::constants::DOCUMENT_VERSION;
use memberlink_core::error::{MemberlinkError, Result};
use memberlink_core::types::Member;
use memberlink_crypto::CredentialCipher;

use crate::document::PersistedMember;
use crate::index::MemberIndex;

/// Kind of non-fatal integrity issue found during load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Another accepted record already holds this external account
    DuplicateExternalAccount,
    /// Another accepted record already holds this subject
    DuplicateSubject,
}

impl AnomalyKind {
    /// Stable name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::DuplicateExternalAccount => "duplicate_external_account",
            AnomalyKind::DuplicateSubject => "duplicate_subject",
        }
    }
}

/// A record dropped during load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    /// What collided
    pub kind: AnomalyKind,
    /// Position of the dropped record in the document
    pub index: usize,
    /// External account of the dropped record
    pub external_account_id: String,
    /// Subject of the dropped record
    pub subject_id: String,
    /// Identity of the earlier record that was kept: its subject for a
    /// duplicate external account, its external account for a duplicate subject
    pub kept: String,
}

/// Result of a successful load.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// The rebuilt index
    pub index: MemberIndex,
    /// Records dropped as duplicates, in document order
    pub anomalies: Vec<Anomaly>,
}

/// Verdict for one raw record.
enum RecordCheck {
    Valid(Member),
    StructurallyInvalid(String),
    DuplicateOf(Anomaly),
}

/// Keys accepted so far in this load.
#[derive(Default)]
struct Accepted {
    by_external_account: HashMap<String, String>,
    by_subject: HashMap<String, String>,
}

/// Parses, validates, decrypts and de-duplicates a document.
pub fn load_document(bytes: &[u8], cipher: &CredentialCipher) -> Result<LoadOutcome> {
    let records = parse_envelope(bytes)?;
    info!(count = records.len(), "Loading members from document");

    let mut accepted = Accepted::default();
    let mut outcome = LoadOutcome::default();

    for (position, raw) in records.iter().enumerate() {
        match check_record(position, raw, cipher, &accepted)? {
            RecordCheck::Valid(member) => {
                accepted
                    .by_external_account
                    .insert(member.external_account_id.clone(), member.subject_id.clone());
                accepted
                    .by_subject
                    .insert(member.subject_id.clone(), member.external_account_id.clone());
                outcome.index.insert(member);
            }
            RecordCheck::DuplicateOf(anomaly) => {
                debug!(index = position, kind = anomaly.kind.as_str(), "Dropping duplicate record");
                outcome.anomalies.push(anomaly);
            }
            RecordCheck::StructurallyInvalid(reason) => {
                error!(
                    index = position,
                    shape = %describe_shape(raw),
                    %reason,
                    "Invalid registry record, aborting load"
                );
                return Err(MemberlinkError::LoadValidation { index: position, reason });
            }
        }
    }

    if !outcome.anomalies.is_empty() {
        let listing: Vec<String> = outcome
            .anomalies
            .iter()
            .map(|a| {
                format!(
                    "{} (record {}: external account {}, subject {}, conflicts with {})",
                    a.kind.as_str(),
                    a.index,
                    a.external_account_id,
                    a.subject_id,
                    a.kept
                )
            })
            .collect();
        warn!(
            count = outcome.anomalies.len(),
            anomalies = ?listing,
            "Registry document contained duplicate records; later occurrences dropped"
        );
    }

    info!(
        members = outcome.index.len(),
        mappings = outcome.index.mapping_count(),
        dropped = outcome.anomalies.len(),
        "Registry document loaded"
    );
    Ok(outcome)
}

/// Checks the document envelope and returns the raw member records.
fn parse_envelope(bytes: &[u8]) -> Result<Vec<Value>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| MemberlinkError::CorruptDocument(format!("not valid JSON: {e}")))?;

    let Value::Object(mut fields) = document else {
        return Err(MemberlinkError::CorruptDocument(
            "document is not a JSON object".into(),
        ));
    };

    match fields.get("version") {
        Some(Value::String(v)) if v == DOCUMENT_VERSION => {}
        Some(Value::String(v)) => {
            return Err(MemberlinkError::VersionMismatch {
                expected: DOCUMENT_VERSION.to_string(),
                actual: v.clone(),
            })
        }
        _ => {
            return Err(MemberlinkError::CorruptDocument(
                "missing or non-string version".into(),
            ))
        }
    }

    match fields.remove("members") {
        Some(Value::Array(records)) => Ok(records),
        _ => Err(MemberlinkError::CorruptDocument(
            "missing members array".into(),
        )),
    }
}

fn check_record(
    position: usize,
    raw: &Value,
    cipher: &CredentialCipher,
    accepted: &Accepted,
) -> Result<RecordCheck> {
    let record = match PersistedMember::deserialize(raw) {
        Ok(record) => record,
        Err(e) => return Ok(RecordCheck::StructurallyInvalid(e.to_string())),
    };
    if record.external_account_id.trim().is_empty() {
        return Ok(RecordCheck::StructurallyInvalid(
            "externalAccountId is empty".into(),
        ));
    }

    let member = record.open(cipher).map_err(|e| {
        error!(
            index = position,
            external_account_id = %record.external_account_id,
            error = %e,
            "Credential decryption failed, aborting load"
        );
        e
    })?;

    if let Some(kept) = accepted.by_external_account.get(&member.external_account_id) {
        return Ok(RecordCheck::DuplicateOf(Anomaly {
            kind: AnomalyKind::DuplicateExternalAccount,
            index: position,
            external_account_id: member.external_account_id.clone(),
            subject_id: member.subject_id.clone(),
            kept: kept.clone(),
        }));
    }
    if let Some(kept) = accepted.by_subject.get(&member.subject_id) {
        return Ok(RecordCheck::DuplicateOf(Anomaly {
            kind: AnomalyKind::DuplicateSubject,
            index: position,
            external_account_id: member.external_account_id.clone(),
            subject_id: member.subject_id.clone(),
            kept: kept.clone(),
        }));
    }

    Ok(RecordCheck::Valid(member))
}

/// Describes a record's structure (keys and JSON types) without any values.
fn describe_shape(value: &Value) -> String {
    fn shape(value: &Value, depth: usize) -> String {
        match value {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Number(_) => "number".into(),
            Value::String(_) => "string".into(),
            Value::Array(items) => format!("array[{}]", items.len()),
            Value::Object(_) if depth == 0 => "object".into(),
            Value::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", shape(v, depth - 1)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
    shape(value, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::encode;
    use crate::index::tests::member;
    use chrono::Utc;
    use memberlink_crypto::EncryptionKey;
    use serde_json::json;
    use test_case::test_case;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&EncryptionKey::from_bytes(&[5u8; 32]).unwrap())
    }

    fn record(c: &CredentialCipher, ext: &str, subject: u64) -> Value {
        serde_json::to_value(PersistedMember::seal(&member(ext, subject), c).unwrap()).unwrap()
    }

    fn document(members: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "version": "1.0",
            "savedAt": Utc::now(),
            "members": members,
        }))
        .unwrap()
    }

    #[test]
    fn test_load_round_trip() {
        let c = cipher();
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 1)).unwrap();
        index.register(member("ext-2", 2)).unwrap();
        index.deactivate("2", Utc::now()).unwrap();

        let bytes = encode(&index, &c, Utc::now()).unwrap();
        let outcome = load_document(&bytes, &c).unwrap();

        assert!(outcome.anomalies.is_empty());
        assert_eq!(outcome.index.len(), 2);
        assert_eq!(outcome.index.mapping_count(), 1);
        assert_eq!(outcome.index.get("1").unwrap().credentials, member("ext-1", 1).credentials);
        assert!(!outcome.index.get("2").unwrap().is_active);
    }

    #[test]
    fn test_duplicates_dropped_first_wins() {
        let c = cipher();
        let bytes = document(vec![
            record(&c, "ext-a", 1),
            record(&c, "ext-a", 2), // shares external account with record 0
            record(&c, "ext-b", 3),
            record(&c, "ext-c", 3), // shares subject with record 2
        ]);

        let outcome = load_document(&bytes, &c).unwrap();

        assert_eq!(outcome.index.len(), 2);
        assert_eq!(outcome.index.mapped_subject("ext-a"), Some("1"));
        assert_eq!(outcome.index.mapped_subject("ext-b"), Some("3"));
        assert!(outcome.index.get("2").is_none());
        assert!(outcome.index.get_by_external_account("ext-c").is_none());

        let kinds: Vec<AnomalyKind> = outcome.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AnomalyKind::DuplicateExternalAccount, AnomalyKind::DuplicateSubject]
        );
        assert_eq!(outcome.anomalies[0].kept, "1");
        assert_eq!(outcome.anomalies[1].index, 3);
        assert_eq!(outcome.anomalies[1].kept, "ext-b");
    }

    #[test_case("non_numeric_subject_id")]
    #[test_case("absent_credentials")]
    #[test_case("absent_external_account")]
    #[test_case("empty_external_account")]
    #[test_case("credentials_not_object")]
    #[test_case("absent_subject_snapshot")]
    fn test_structurally_invalid_aborts_load(corruption: &str) {
        let c = cipher();
        let mut bad = record(&c, "ext-bad", 9);
        let obj = bad.as_object_mut().unwrap();
        match corruption {
            "non_numeric_subject_id" => obj["subjectSnapshot"]["id"] = json!("abc"),
            "absent_credentials" => {
                obj.remove("credentials");
            }
            "absent_external_account" => {
                obj.remove("externalAccountId");
            }
            "empty_external_account" => obj["externalAccountId"] = json!("  "),
            "credentials_not_object" => obj["credentials"] = json!("opaque"),
            "absent_subject_snapshot" => {
                obj.remove("subjectSnapshot");
            }
            other => unreachable!("unknown corruption {other}"),
        }
        let bytes = document(vec![record(&c, "ext-good", 1), bad]);

        let err = load_document(&bytes, &c).unwrap_err();
        assert!(matches!(err, MemberlinkError::LoadValidation { index: 1, .. }));
    }

    #[test]
    fn test_tampered_credentials_abort_load() {
        let c = cipher();
        let mut bad = record(&c, "ext-1", 1);
        bad["credentials"]["authTag"] = json!("00".repeat(16));
        let bytes = document(vec![bad]);

        assert!(matches!(load_document(&bytes, &c), Err(MemberlinkError::Decryption(_))));
    }

    #[test]
    fn test_wrong_key_aborts_load() {
        let bytes = document(vec![record(&cipher(), "ext-1", 1)]);
        let other = CredentialCipher::new(&EncryptionKey::from_bytes(&[6u8; 32]).unwrap());
        assert!(matches!(load_document(&bytes, &other), Err(MemberlinkError::Decryption(_))));
    }

    #[test_case(b"not json".as_slice(); "not json")]
    #[test_case(br#"[]"#.as_slice(); "not an object")]
    #[test_case(br#"{"members":[]}"#.as_slice(); "missing version")]
    #[test_case(br#"{"version":1.0,"members":[]}"#.as_slice(); "numeric version")]
    #[test_case(br#"{"version":"1.0"}"#.as_slice(); "missing members")]
    #[test_case(br#"{"version":"1.0","members":{}}"#.as_slice(); "members not an array")]
    fn test_unusable_envelope_is_corrupt_document(bytes: &[u8]) {
        let err = load_document(bytes, &cipher()).unwrap_err();
        assert!(matches!(err, MemberlinkError::CorruptDocument(_)), "{err:?}");
        assert!(err.is_load_error());
    }

    #[test]
    fn test_version_mismatch() {
        let err = load_document(br#"{"version":"2.0","members":[]}"#, &cipher()).unwrap_err();
        match err {
            MemberlinkError::VersionMismatch { expected, actual } => {
                assert_eq!(expected, "1.0");
                assert_eq!(actual, "2.0");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let c = cipher();
        let mut r = record(&c, "ext-1", 1);
        let obj = r.as_object_mut().unwrap();
        obj.remove("isActive");
        obj.remove("profileSnapshot");
        obj.remove("registeredAt");
        obj["subjectSnapshot"]["id"] = json!("1");

        let outcome = load_document(&document(vec![r]), &c).unwrap();
        let m = outcome.index.get("1").unwrap();
        assert!(m.is_active);
        assert!(m.profile.fields.is_empty());
        assert_eq!(outcome.index.mapping_count(), 1);
    }

    #[test]
    fn test_describe_shape_hides_values() {
        let raw = json!({
            "externalAccountId": "secret-id",
            "subjectSnapshot": {"id": "abc"},
            "credentials": {"cipherBlob": "deadbeef"}
        });
        let shape = describe_shape(&raw);
        assert!(shape.contains("externalAccountId: string"));
        assert!(shape.contains("id: string"));
        assert!(!shape.contains("secret-id"));
        assert!(!shape.contains("deadbeef"));
    }
}
