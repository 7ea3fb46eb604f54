//! Decides which listed objects need propagating.

use crate::models::object::ObjectDescriptor;
use chrono::{DateTime, Utc};

/// True iff the object has a modification time strictly after `watermark`.
///
/// Objects without a (parseable) modification time are never selected.
pub fn is_changed(descriptor: &ObjectDescriptor, watermark: DateTime<Utc>) -> bool {
    descriptor
        .last_modified
        .is_some_and(|modified| modified > watermark)
}
