//! Persisted registry document.
//!
//! # Format
//!
//! ```text
//! {
//!   "version": "1.0",
//!   "savedAt": "2024-05-01T12:00:00Z",
//!   "members": [
//!     {
//!       "externalAccountId": "...",
//!       "profileSnapshot": { ... },
//!       "subjectSnapshot": { "id": 123, ... },
//!       "credentials": { "cipherBlob": "<hex>", "iv": "<hex>", "authTag": "<hex>" },
//!       "registeredAt": "...",
//!       "lastCredentialRefresh": "...",
//!       "isActive": true,
//!       "deactivatedAt": "..."            (inactive members only)
//!     }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use memberlink_core::constants::DOCUMENT_VERSION;
use memberlink_core::error::Result;
use memberlink_core::types::{EncryptedCredentials, Member, ProfileSnapshot, SubjectSnapshot};
use memberlink_crypto::CredentialCipher;

use crate::index::MemberIndex;

/// Top-level document written by every save.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    /// Format version, always [`DOCUMENT_VERSION`] when written
    pub version: String,
    /// When the document was produced
    pub saved_at: DateTime<Utc>,
    /// Every member, active or not
    pub members: Vec<PersistedMember>,
}

/// One member as stored on disk, with credentials sealed.
///
/// Only `externalAccountId`, `subjectSnapshot` and `credentials` are required
/// when reading; the remaining fields fall back to sensible defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMember {
    /// Registering party
    pub external_account_id: String,
    /// Registering party's profile
    #[serde(default)]
    pub profile_snapshot: ProfileSnapshot,
    /// Linked subject's profile; `id` is the primary key
    pub subject_snapshot: SubjectSnapshot,
    /// AES-GCM sealed credentials
    pub credentials: EncryptedCredentials,
    /// Registration time
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
    /// Last credential replacement
    #[serde(default = "Utc::now")]
    pub last_credential_refresh: DateTime<Utc>,
    /// Records written before deactivation existed have no flag
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    /// Set only while inactive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
}

fn active_by_default() -> bool {
    true
}

impl PersistedMember {
    /// Seals a member's credentials for writing.
    pub fn seal(member: &Member, cipher: &CredentialCipher) -> Result<Self> {
        Ok(Self {
            external_account_id: member.external_account_id.clone(),
            profile_snapshot: member.profile.clone(),
            subject_snapshot: member.subject.clone(),
            credentials: cipher.encrypt(&member.credentials)?,
            registered_at: member.registered_at,
            last_credential_refresh: member.last_credential_refresh,
            is_active: member.is_active,
            deactivated_at: if member.is_active {
                None
            } else {
                member.deactivated_at
            },
        })
    }

    /// Decrypts the credentials and rebuilds the in-memory member.
    pub fn open(&self, cipher: &CredentialCipher) -> Result<Member> {
        let credentials = cipher.decrypt(&self.credentials)?;
        Ok(Member {
            external_account_id: self.external_account_id.clone(),
            subject_id: self.subject_snapshot.subject_id(),
            profile: self.profile_snapshot.clone(),
            subject: self.subject_snapshot.clone(),
            credentials,
            registered_at: self.registered_at,
            last_credential_refresh: self.last_credential_refresh,
            is_active: self.is_active,
            deactivated_at: if self.is_active {
                None
            } else {
                self.deactivated_at
            },
        })
    }
}

/// Serializes the whole index into document bytes.
///
/// Members are ordered by registration time, then subject id, so repeated
/// saves of the same state differ only in `savedAt` and fresh IVs.
pub fn encode(index: &MemberIndex, cipher: &CredentialCipher, now: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut members: Vec<&Member> = index.members().collect();
    members.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.subject.id.cmp(&b.subject.id))
    });

    let document = RegistryDocument {
        version: DOCUMENT_VERSION.to_string(),
        saved_at: now,
        members: members
            .into_iter()
            .map(|m| PersistedMember::seal(m, cipher))
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(serde_json::to_vec_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::member;
    use memberlink_crypto::EncryptionKey;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&EncryptionKey::from_bytes(&[3u8; 32]).unwrap())
    }

    #[test]
    fn test_encode_shape() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();
        index.register(member("ext-2", 200)).unwrap();
        index.deactivate("200", Utc::now()).unwrap();

        let bytes = encode(&index, &cipher(), Utc::now()).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["version"], "1.0");
        assert!(doc["savedAt"].is_string());
        let members = doc["members"].as_array().unwrap();
        assert_eq!(members.len(), 2);

        for m in members {
            assert!(m["credentials"]["cipherBlob"].is_string());
            assert!(m["credentials"]["iv"].is_string());
            assert!(m["credentials"]["authTag"].is_string());
            assert!(m.get("subjectId").is_none());
        }

        let inactive = members
            .iter()
            .find(|m| m["externalAccountId"] == "ext-2")
            .unwrap();
        assert_eq!(inactive["isActive"], false);
        assert!(inactive["deactivatedAt"].is_string());
    }

    #[test]
    fn test_credentials_not_in_clear() {
        let mut index = MemberIndex::new();
        index.register(member("ext-1", 100)).unwrap();

        let bytes = encode(&index, &cipher(), Utc::now()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("access-100"));
        assert!(!text.contains("refresh-100"));
    }

    #[test]
    fn test_seal_open_preserves_member() {
        let c = cipher();
        let original = member("ext-9", 900);
        let opened = PersistedMember::seal(&original, &c).unwrap().open(&c).unwrap();
        assert_eq!(opened, original);
    }
}
