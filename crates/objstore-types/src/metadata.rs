use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-native object metadata (cloud object tags, user metadata headers).
///
/// Keys are unique; iteration order is unspecified. Keys and values are
/// opaque strings: any length or charset limit is the backend's to enforce.
pub type ObjectAttributes = HashMap<String, String>;

/// Normalized view of a stored object, regardless of backend.
///
/// `size_bytes` always reflects the committed size at the time of the call.
/// The optional fields stay `None` when the backend cannot supply them
/// cheaply; `attributes: None` means "not supported", which is distinct
/// from `Some` of an empty map.
///
/// Metadata is a snapshot. Nothing guarantees it stays accurate after the
/// call that produced it returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Committed object size in bytes.
    pub size_bytes: u64,
    /// Time of the last committed write, when the backend tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Attached attributes, when the backend supports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ObjectAttributes>,
}

impl ObjectMetadata {
    /// Metadata carrying only a size.
    pub fn new(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            last_modified: None,
            attributes: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Look up a single attribute value.
    ///
    /// Returns `None` both when the key is missing and when the backend
    /// reported no attribute map at all.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|attrs| attrs.get(key))
            .map(String::as_str)
    }

    /// Returns `true` if the backend reported an attribute map.
    pub fn has_attributes(&self) -> bool {
        self.attributes.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_has_no_optional_fields() {
        let meta = ObjectMetadata::new(42);
        assert_eq!(meta.size_bytes, 42);
        assert!(meta.last_modified.is_none());
        assert!(!meta.has_attributes());
    }

    #[test]
    fn absent_and_empty_attributes_differ() {
        let absent = ObjectMetadata::new(0);
        let empty = ObjectMetadata::new(0).with_attributes(ObjectAttributes::new());
        assert_ne!(absent, empty);
        assert!(empty.has_attributes());
        assert!(empty.attribute("anything").is_none());
    }

    #[test]
    fn attribute_lookup() {
        let mut attrs = ObjectAttributes::new();
        attrs.insert("content-type".into(), "application/octet-stream".into());
        let meta = ObjectMetadata::new(3).with_attributes(attrs);
        assert_eq!(meta.attribute("content-type"), Some("application/octet-stream"));
        assert_eq!(meta.attribute("missing"), None);
    }

    #[test]
    fn json_skips_absent_fields() {
        let meta = ObjectMetadata::new(7);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"size_bytes":7}"#);

        let back: ObjectMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn json_keeps_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let meta = ObjectMetadata::new(1).with_last_modified(ts);
        let json = serde_json::to_string(&meta).unwrap();
        let back: ObjectMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_modified, Some(ts));
    }
}
