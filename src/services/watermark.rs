//! Persisted scan watermark.
//!
//! The watermark is a single blob holding an ISO-8601 timestamp: the start
//! time of the last scan that completed its listing. Objects modified at or
//! before it are considered processed.

use crate::{
    models::object::{ContentSettings, ObjectProperties},
    services::object_store::{ObjectStore, Provisioned, StoreError},
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("watermark `{blob}` could not be read: {source}")]
    Read {
        blob: String,
        #[source]
        source: StoreError,
    },
    #[error("watermark `{blob}` holds an invalid timestamp `{raw}`")]
    Parse { blob: String, raw: String },
    #[error("watermark `{blob}` could not be written: {source}")]
    Write {
        blob: String,
        #[source]
        source: StoreError,
    },
}

/// Parse a stored watermark.
///
/// Accepts RFC 3339 with any offset, and naive ISO-8601 without an offset,
/// which is taken as UTC.
pub fn parse_watermark(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub struct WatermarkStore {
    store: Arc<dyn ObjectStore>,
    container: String,
    blob: String,
}

impl WatermarkStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            blob: blob.into(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Create the container holding the watermark blob if it is missing.
    pub async fn ensure_container(&self) -> Result<Provisioned, StoreError> {
        self.store.create_container(&self.container).await
    }

    /// The stored watermark, `Ok(None)` if none was ever written.
    pub async fn load(&self) -> Result<Option<DateTime<Utc>>, WatermarkError> {
        let read_err = |source| WatermarkError::Read {
            blob: self.blob.clone(),
            source,
        };

        let exists = match self.store.object_exists(&self.container, &self.blob).await {
            Ok(exists) => exists,
            Err(StoreError::ContainerNotFound(_)) => false,
            Err(err) => return Err(read_err(err)),
        };
        if !exists {
            return Ok(None);
        }

        let data = self
            .store
            .read_object(&self.container, &self.blob)
            .await
            .map_err(read_err)?;
        let raw = String::from_utf8_lossy(&data);
        parse_watermark(&raw)
            .map(Some)
            .ok_or_else(|| WatermarkError::Parse {
                blob: self.blob.clone(),
                raw: raw.into_owned(),
            })
    }

    /// The stored watermark, or the minimum timestamp when it is absent,
    /// unreadable or garbled. Never fails; problems are logged.
    pub async fn read(&self) -> DateTime<Utc> {
        match self.load().await {
            Ok(Some(ts)) => {
                info!("Last scan time retrieved: {}", format_watermark(ts));
                ts
            }
            Ok(None) => {
                info!(
                    "'{}' not found. Starting scan from minimum time.",
                    self.blob
                );
                DateTime::<Utc>::MIN_UTC
            }
            Err(err @ WatermarkError::Parse { .. }) => {
                warn!("{}. Starting from minimum time.", err);
                DateTime::<Utc>::MIN_UTC
            }
            Err(err) => {
                error!("{}. Starting from minimum time.", err);
                DateTime::<Utc>::MIN_UTC
            }
        }
    }

    /// Overwrite the stored watermark unconditionally.
    pub async fn write(&self, ts: DateTime<Utc>) -> Result<(), WatermarkError> {
        let body = Bytes::from(format_watermark(ts));
        let properties = ObjectProperties {
            content: ContentSettings {
                content_type: Some("text/plain".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.store
            .write_object(&self.container, &self.blob, body, properties)
            .await
            .map(|_| ())
            .map_err(|source| WatermarkError::Write {
                blob: self.blob.clone(),
                source,
            })
    }
}
