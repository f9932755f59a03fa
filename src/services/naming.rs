//! Object key derivation for uploaded files.

use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Prefix under which uploads are stored and listed by default.
pub const UPLOAD_PREFIX: &str = "uploads/";

/// How an upload's object key is derived from its file name.
///
/// Every policy starts with `uploads/<unix-seconds>-`. `Timestamp` stops
/// there, so two same-second uploads of the same file name share a key and the
/// later one overwrites the earlier. `Uuid` adds a random segment to rule that
/// out; `ContentHash` adds a digest of the bytes so only identical content
/// collapses onto one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    #[default]
    Timestamp,
    Uuid,
    ContentHash,
}

impl KeyPolicy {
    pub fn derive(&self, file_name: &str, uploaded_at: DateTime<Utc>, digest: &md5::Digest) -> String {
        let secs = uploaded_at.timestamp();
        match self {
            KeyPolicy::Timestamp => format!("{UPLOAD_PREFIX}{secs}-{file_name}"),
            KeyPolicy::Uuid => {
                let id = Uuid::new_v4().simple().to_string();
                format!("{UPLOAD_PREFIX}{secs}-{}-{file_name}", &id[..8])
            }
            KeyPolicy::ContentHash => {
                let hex = format!("{:x}", digest);
                format!("{UPLOAD_PREFIX}{secs}-{}-{file_name}", &hex[..12])
            }
        }
    }

    /// Whether two same-second uploads with the same name can overwrite
    /// each other with different content.
    pub fn may_collide(&self) -> bool {
        matches!(self, KeyPolicy::Timestamp)
    }
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(KeyPolicy::Timestamp),
            "uuid" => Ok(KeyPolicy::Uuid),
            "content-hash" | "md5" => Ok(KeyPolicy::ContentHash),
            other => Err(format!(
                "unknown key policy `{}` (expected timestamp, uuid or content-hash)",
                other
            )),
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyPolicy::Timestamp => "timestamp",
            KeyPolicy::Uuid => "uuid",
            KeyPolicy::ContentHash => "content-hash",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn timestamp_policy_matches_legacy_layout() {
        let key = KeyPolicy::Timestamp.derive("a.txt", at(), &md5::compute(b"x"));
        assert_eq!(key, "uploads/1700000000-a.txt");
        assert!(KeyPolicy::Timestamp.may_collide());
    }

    #[test]
    fn uuid_policy_separates_same_second_uploads() {
        let digest = md5::compute(b"x");
        let first = KeyPolicy::Uuid.derive("a.txt", at(), &digest);
        let second = KeyPolicy::Uuid.derive("a.txt", at(), &digest);
        assert_ne!(first, second);
        assert!(first.starts_with("uploads/1700000000-"));
        assert!(first.ends_with("-a.txt"));
    }

    #[test]
    fn content_hash_policy_is_stable_per_content() {
        let same = KeyPolicy::ContentHash.derive("a.txt", at(), &md5::compute(b"hello"));
        let again = KeyPolicy::ContentHash.derive("a.txt", at(), &md5::compute(b"hello"));
        let other = KeyPolicy::ContentHash.derive("a.txt", at(), &md5::compute(b"world"));
        assert_eq!(same, again);
        assert_ne!(same, other);
        assert_eq!(same, "uploads/1700000000-5d41402abc4b-a.txt");
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("UUID".parse::<KeyPolicy>().unwrap(), KeyPolicy::Uuid);
        assert_eq!("md5".parse::<KeyPolicy>().unwrap(), KeyPolicy::ContentHash);
        assert_eq!(KeyPolicy::ContentHash.to_string(), "content-hash");
        assert!("random".parse::<KeyPolicy>().is_err());
    }
}
