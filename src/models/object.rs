//! Represents an object (file) stored in the gateway's bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback MIME type for objects stored without an explicit content type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for a single object held by the backing store.
///
/// The descriptor never carries payload bytes; those are read through the
/// gateway's buffered or streaming download paths.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: i64,

    /// Content type (MIME type) if the backend reported one.
    pub content_type: Option<String>,

    /// Timestamp when the object was last written.
    pub last_modified: Option<DateTime<Utc>>,

    /// Entity tag reported by the backend, without surrounding quotes.
    pub etag: Option<String>,
}

impl ObjectDescriptor {
    /// Content type with the gateway default applied.
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Last path segment of the key, used as the user-facing file name.
    pub fn file_name(&self) -> &str {
        base_name(&self.key)
    }
}

/// Return the final `/`- or `\`-separated segment of a path-like string.
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(key: &str, content_type: Option<&str>) -> ObjectDescriptor {
        ObjectDescriptor {
            key: key.to_string(),
            size: 3,
            content_type: content_type.map(str::to_string),
            last_modified: None,
            etag: None,
        }
    }

    #[test]
    fn file_name_is_last_key_segment() {
        assert_eq!(descriptor("uploads/1700000000-a.txt", None).file_name(), "1700000000-a.txt");
        assert_eq!(descriptor("plain", None).file_name(), "plain");
        assert_eq!(base_name("C:\\Users\\me\\report.pdf"), "report.pdf");
    }

    #[test]
    fn missing_or_empty_content_type_falls_back() {
        assert_eq!(descriptor("k", None).content_type_or_default(), DEFAULT_CONTENT_TYPE);
        assert_eq!(descriptor("k", Some("")).content_type_or_default(), DEFAULT_CONTENT_TYPE);
        assert_eq!(descriptor("k", Some("text/plain")).content_type_or_default(), "text/plain");
    }
}
