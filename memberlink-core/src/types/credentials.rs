//! Credential types.
//!
//! - [`Credentials`]: Plaintext token set held in memory (zeroized on drop)
//! - [`EncryptedCredentials`]: Hex-encoded AES-GCM output written to disk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

// ═══════════════════════════════════════════════════════════════════════════════
// PLAINTEXT CREDENTIALS
// ═══════════════════════════════════════════════════════════════════════════════

/// OAuth-style credentials issued by the external service for one subject.
///
/// Token strings are wiped from memory when the value is dropped.
/// The `Debug` output never includes token material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Bearer token for API calls
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// Instant the access token stops being valid
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
    /// Token type reported by the issuer (usually "Bearer")
    pub token_type: String,
}

impl Credentials {
    /// Creates a bearer credential set.
    pub fn bearer(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            token_type: "Bearer".into(),
        }
    }

    /// Returns true if the access token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENCRYPTED CREDENTIALS
// ═══════════════════════════════════════════════════════════════════════════════

/// At-rest form of [`Credentials`].
///
/// All three fields are lowercase hex. Only this sub-record of a member is
/// encrypted; the rest of the persisted record is stored in clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedCredentials {
    /// AES-GCM ciphertext without the tag
    pub cipher_blob: String,
    /// 12-byte initialization vector
    pub iv: String,
    /// 16-byte authentication tag
    pub auth_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials::bearer("access-secret", "refresh-secret", Utc::now());
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("Bearer"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let creds = Credentials::bearer("a", "r", now + Duration::hours(6));
        assert!(!creds.is_expired_at(now));
        assert!(creds.is_expired_at(now + Duration::hours(6)));
    }

    #[test]
    fn test_camel_case_wire_names() {
        let creds = Credentials::bearer("a", "r", Utc::now());
        let json = serde_json::to_value(&creds).unwrap();
        assert!(json.get("accessToken").is_some());
        assert!(json.get("refreshToken").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("tokenType").is_some());

        let sealed = EncryptedCredentials {
            cipher_blob: "00".into(),
            iv: "11".into(),
            auth_tag: "22".into(),
        };
        let json = serde_json::to_value(&sealed).unwrap();
        assert_eq!(json["cipherBlob"], "00");
        assert_eq!(json["authTag"], "22");
    }
}
