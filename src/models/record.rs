//! Rows written to the metadata table, one per scanned object.

use crate::models::object::ObjectDescriptor;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Blob type reported for every object; the local store only has block blobs.
const BLOB_TYPE: &str = "BlockBlob";

/// One metadata row, keyed by `(partition_key, row_key)`.
///
/// The partition is the source container name and the row key is the object
/// key passed through [`sanitize_row_key`]. Every other field mirrors the
/// object descriptor; re-recording an object overwrites the whole row.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataRecord {
    #[serde(skip)]
    pub partition_key: String,
    #[serde(skip)]
    pub row_key: String,
    pub blob_name: String,
    pub blob_size: u64,
    pub last_modified: Option<String>,
    pub creation_time: Option<String>,
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    pub blob_type: String,
    pub content_type: Option<String>,
    #[serde(rename = "ContentMD5")]
    pub content_md5: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
    /// Uploader metadata serialized as a JSON object (`{}` when empty).
    pub custom_metadata: String,
}

impl MetadataRecord {
    /// Build the row for `descriptor` as listed from `container`.
    pub fn from_descriptor(
        container: &str,
        descriptor: &ObjectDescriptor,
    ) -> Result<Self, serde_json::Error> {
        let content = &descriptor.content;
        Ok(Self {
            partition_key: container.to_string(),
            row_key: sanitize_row_key(&descriptor.key),
            blob_name: descriptor.key.clone(),
            blob_size: descriptor.size,
            last_modified: descriptor.last_modified.as_ref().map(format_timestamp),
            creation_time: descriptor.created_at.as_ref().map(format_timestamp),
            etag: descriptor.etag.clone(),
            blob_type: BLOB_TYPE.to_string(),
            content_type: content.content_type.clone(),
            content_md5: descriptor
                .content_md5
                .as_ref()
                .map(|digest| general_purpose::STANDARD.encode(digest)),
            content_encoding: content.content_encoding.clone(),
            content_disposition: content.content_disposition.clone(),
            content_language: content.content_language.clone(),
            cache_control: content.cache_control.clone(),
            custom_metadata: serde_json::to_string(&descriptor.metadata)?,
        })
    }

    /// The non-key columns as a JSON object, ready for a table upsert.
    pub fn fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // A struct always serializes to an object.
            other => Ok(Map::from_iter([("Value".to_string(), other)])),
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Characters the table backend refuses in keys, plus the escape marker itself.
fn needs_escape(c: char) -> bool {
    matches!(c, '%' | '/' | '\\' | '#' | '?') || c.is_control()
}

/// Map an object key onto a valid table row key.
///
/// Path separators and the other characters table keys cannot hold are
/// percent-escaped (`/` becomes `%2F`). `%` itself is escaped too, so the
/// mapping is deterministic and reversible.
pub fn sanitize_row_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::object::ContentSettings;
    use std::collections::BTreeMap;

    /// Invert [`sanitize_row_key`]. Returns `None` for malformed escapes.
    fn restore_row_key(row_key: &str) -> Option<String> {
        let bytes = row_key.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = row_key.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).ok()
    }

    fn descriptor(key: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            key: key.to_string(),
            size: 42,
            last_modified: Some(
                DateTime::parse_from_rfc3339("2026-10-16T08:00:00.5Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            created_at: None,
            etag: Some("abc".into()),
            content_md5: Some(vec![0xde, 0xad, 0xbe, 0xef]),
            content: ContentSettings {
                content_type: Some("text/csv".into()),
                ..Default::default()
            },
            metadata: BTreeMap::from([("owner".to_string(), "ops".to_string())]),
        }
    }

    #[test]
    fn plain_keys_are_unchanged() {
        assert_eq!(sanitize_row_key("a.txt"), "a.txt");
        assert_eq!(sanitize_row_key("b.csv"), "b.csv");
    }

    #[test]
    fn separators_are_escaped_and_reversible() {
        let key = "reports/2026/q3%final#1?.csv";
        let row = sanitize_row_key(key);
        assert!(!row.contains('/'));
        assert!(!row.contains('#'));
        assert!(!row.contains('?'));
        assert_eq!(row, "reports%2F2026%2Fq3%25final%231%3F.csv");
        assert_eq!(restore_row_key(&row).as_deref(), Some(key));
    }

    #[test]
    fn distinct_keys_never_collide() {
        // Without escaping `%`, these two would map to the same row key.
        assert_ne!(sanitize_row_key("a/b"), sanitize_row_key("a%2Fb"));
    }

    #[test]
    fn restore_rejects_truncated_escapes() {
        assert_eq!(restore_row_key("bad%2"), None);
        assert_eq!(restore_row_key("bad%zz"), None);
    }

    #[test]
    fn record_mirrors_descriptor() {
        let record = MetadataRecord::from_descriptor("input", &descriptor("dir/a.txt")).unwrap();
        assert_eq!(record.partition_key, "input");
        assert_eq!(record.row_key, "dir%2Fa.txt");
        assert_eq!(record.blob_name, "dir/a.txt");
        assert_eq!(record.content_md5.as_deref(), Some("3q2+7w=="));
        assert_eq!(record.custom_metadata, r#"{"owner":"ops"}"#);
        assert_eq!(record.last_modified.as_deref(), Some("2026-10-16T08:00:00.500Z"));

        let fields = record.fields().unwrap();
        assert_eq!(fields["BlobSize"], 42);
        assert_eq!(fields["ETag"], "abc");
        assert_eq!(fields["ContentType"], "text/csv");
        assert!(fields["CreationTime"].is_null());
        assert!(!fields.contains_key("PartitionKey"));
    }

    #[test]
    fn empty_metadata_serializes_as_empty_object() {
        let mut desc = descriptor("a.txt");
        desc.metadata.clear();
        let record = MetadataRecord::from_descriptor("input", &desc).unwrap();
        assert_eq!(record.custom_metadata, "{}");
    }
}
