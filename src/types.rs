//! Core types for the subscription registry.

use crate::error::{NotifyError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Extension used for record files.
pub const RECORD_EXTENSION: &str = "json";

/// Longest key that is used verbatim as a file stem.
const MAX_STEM_LEN: usize = 200;

/// Client key material of a push subscription.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Client public key (base64url). Also the record's identity.
    pub p256dh: String,
    /// Client auth secret (base64url).
    pub auth: String,
}

/// One registered push destination.
///
/// Serialized exactly as browsers hand it out from `PushSubscription.toJSON()`,
/// minus `expirationTime`, which is ignored on input.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Push service delivery URL.
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

impl SubscriptionRecord {
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }

    /// Parse a subscription from its JSON form.
    pub fn from_json(input: &str) -> Result<Self> {
        let record: SubscriptionRecord = serde_json::from_str(input.trim())?;
        record.validate()?;
        Ok(record)
    }

    /// The identifier the registry stores this record under.
    pub fn key(&self) -> &str {
        &self.keys.p256dh
    }

    /// Check that every field is populated.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(NotifyError::InvalidRecord("empty endpoint".into()));
        }
        if self.keys.p256dh.trim().is_empty() {
            return Err(NotifyError::InvalidRecord("empty p256dh key".into()));
        }
        if self.keys.auth.trim().is_empty() {
            return Err(NotifyError::InvalidRecord("empty auth secret".into()));
        }
        Ok(())
    }

    /// File name this record is persisted under.
    pub fn file_name(&self) -> String {
        record_file_name(self.key())
    }
}

// Key material stays out of logs.
impl fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("endpoint", &self.endpoint)
            .field("p256dh", &self.keys.p256dh)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SubscriptionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionKeys")
            .field("p256dh", &self.p256dh)
            .finish_non_exhaustive()
    }
}

/// Where a record currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordState {
    Active,
    Quarantined,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Active => write!(f, "active"),
            RecordState::Quarantined => write!(f, "quarantined"),
        }
    }
}

/// Map a client key to the file name its record is stored under.
///
/// Standard-alphabet base64 is folded onto the URL-safe alphabet and padding
/// is dropped, so both encodings of the same key land on the same file.
/// Keys that still aren't filename-safe are named by their SHA-256.
pub fn record_file_name(key: &str) -> String {
    let stem: String = key
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let safe = !stem.is_empty()
        && stem.len() <= MAX_STEM_LEN
        && stem
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if safe {
        format!("{stem}.{RECORD_EXTENSION}")
    } else {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}.{RECORD_EXTENSION}", hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_browser_subscription() {
        let json = r#"{"endpoint":"https://push.example/abc","expirationTime":null,"keys":{"p256dh":"BKey","auth":"secret"}}"#;
        let record = SubscriptionRecord::from_json(json).unwrap();
        assert_eq!(record.endpoint, "https://push.example/abc");
        assert_eq!(record.key(), "BKey");
        assert_eq!(record.keys.auth, "secret");
    }

    #[test]
    fn test_reject_missing_fields() {
        let json = r#"{"endpoint":"https://push.example/abc","keys":{"p256dh":"BKey","auth":""}}"#;
        assert!(matches!(
            SubscriptionRecord::from_json(json),
            Err(NotifyError::InvalidRecord(_))
        ));

        let json = r#"{"endpoint":"https://push.example/abc"}"#;
        assert!(matches!(
            SubscriptionRecord::from_json(json),
            Err(NotifyError::Deserialization(_))
        ));
    }

    #[test]
    fn test_file_name_folds_alphabets() {
        assert_eq!(record_file_name("BAbc-_x"), "BAbc-_x.json");
        assert_eq!(record_file_name("BAbc+/x=="), "BAbc-_x.json");
    }

    #[test]
    fn test_file_name_hashes_unsafe_keys() {
        let name = record_file_name("../../etc/passwd");
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(!name.contains('/'));

        let long = "a".repeat(MAX_STEM_LEN + 1);
        assert_eq!(record_file_name(&long).len(), 64 + ".json".len());
    }

    #[test]
    fn test_debug_hides_auth_secret() {
        let record = SubscriptionRecord::new("https://push.example/1", "BKey", "very-secret");
        assert!(!format!("{record:?}").contains("very-secret"));
    }
}
