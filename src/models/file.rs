//! Response-facing projection of a stored object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::ObjectDescriptor;

/// File metadata returned by the upload and listing endpoints.
///
/// Built per response from an [`ObjectDescriptor`] plus a freshly minted
/// share link; never persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_name: String,
    pub size: i64,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl FileDescriptor {
    /// Project a listed object. Objects without a modification time report
    /// `fallback_time`.
    pub fn from_object(
        object: &ObjectDescriptor,
        url: Option<String>,
        fallback_time: DateTime<Utc>,
    ) -> Self {
        Self {
            file_name: object.file_name().to_string(),
            size: object.size,
            content_type: object.content_type_or_default().to_string(),
            url,
            uploaded_at: object.last_modified.unwrap_or(fallback_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_camel_case_and_omits_missing_url() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let file = FileDescriptor {
            file_name: "a.txt".into(),
            size: 10,
            content_type: "text/plain".into(),
            url: None,
            uploaded_at: at,
        };

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["fileName"], "a.txt");
        assert_eq!(json["contentType"], "text/plain");
        assert_eq!(json["uploadedAt"], "2024-05-01T12:00:00Z");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn from_object_uses_key_base_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let object = ObjectDescriptor {
            key: "uploads/1714564800-report.pdf".into(),
            size: 42,
            content_type: None,
            last_modified: None,
            etag: Some("abc".into()),
        };

        let file = FileDescriptor::from_object(&object, Some("http://x".into()), at);
        assert_eq!(file.file_name, "1714564800-report.pdf");
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(file.uploaded_at, at);
        assert_eq!(file.url.as_deref(), Some("http://x"));
    }
}
