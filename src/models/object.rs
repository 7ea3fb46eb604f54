//! Represents an object (blob) as seen by one listing pass.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// HTTP-style content headers stored alongside an object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentSettings {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

/// Everything a writer may attach to an object besides its bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectProperties {
    pub content: ContentSettings,

    /// Free-form key/value metadata set by the uploader.
    pub metadata: BTreeMap<String, String>,
}

/// Snapshot of a single object taken at listing time.
///
/// Produced fresh by every listing and never cached across runs. Timestamps
/// are optional because a backend may omit them or hold values that fail to
/// parse; such objects are treated as unchanged by the scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Full object key (path-like identifier within the container).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last written.
    pub last_modified: Option<DateTime<Utc>>,

    /// Timestamp when the object was first created.
    pub created_at: Option<DateTime<Utc>>,

    /// Opaque version tag assigned by the store.
    pub etag: Option<String>,

    /// MD5 digest of the content, if the store computed one.
    pub content_md5: Option<Vec<u8>>,

    pub content: ContentSettings,

    pub metadata: BTreeMap<String, String>,
}

impl ObjectDescriptor {
    /// Properties to carry over when this object is copied elsewhere.
    pub fn properties(&self) -> ObjectProperties {
        ObjectProperties {
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
