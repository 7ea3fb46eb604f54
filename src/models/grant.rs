//! Short-lived, single-object read grants (the local analogue of a SAS URL).

use chrono::{DateTime, SecondsFormat, Utc};

/// Permission string carried by grants that only allow reading.
pub const READ_PERMISSION: &str = "r";

/// A signed token allowing one object to be read until `expires_at`.
///
/// The signature covers every other field, so a grant cannot be widened to
/// another object, another permission or a later expiry without the account
/// key.
#[derive(Clone, PartialEq, Eq)]
pub struct ReadGrant {
    pub container: String,
    pub key: String,
    pub permissions: String,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl ReadGrant {
    /// Canonical string the signature is computed over.
    pub fn string_to_sign(
        container: &str,
        key: &str,
        permissions: &str,
        expires_at: &DateTime<Utc>,
    ) -> String {
        format!(
            "{}\n{}\n/{}/{}",
            permissions,
            expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            container,
            key
        )
    }
}

// Keep signatures out of logs.
impl std::fmt::Debug for ReadGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadGrant")
            .field("container", &self.container)
            .field("key", &self.key)
            .field("permissions", &self.permissions)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
