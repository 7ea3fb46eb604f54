//! Error taxonomy for one scan.
//!
//! Only [`ScanError`] aborts a run. Copy, record and provisioning failures are
//! logged and counted by the orchestrator, and the run carries on.

use crate::services::{object_store::StoreError, table_store::TableError};
use std::time::Duration;
use thiserror::Error;

/// Failure to propagate one object to the target container.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("could not issue read grant for `{key}`: {source}")]
    Grant {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("copy of `{key}` failed: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("copy of `{key}` timed out after {timeout:?}")]
    TimedOut { key: String, timeout: Duration },
    #[error("copy task for `{key}` did not finish: {source}")]
    Task {
        key: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Failure to upsert the metadata row for one object.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("could not serialize metadata for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("metadata upsert for `{key}` failed: {source}")]
    Table {
        key: String,
        #[source]
        source: TableError,
    },
    #[error("metadata upsert for `{key}` timed out after {timeout:?}")]
    TimedOut { key: String, timeout: Duration },
}

/// Failure to create a destination that is neither success nor "already exists".
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("could not create container `{name}`: {source}")]
    Container {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("could not create table `{name}`: {source}")]
    Table {
        name: String,
        #[source]
        source: TableError,
    },
}

/// Scan-level failure; the watermark is left where it was.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("listing container `{container}` failed: {source}")]
    Listing {
        container: String,
        #[source]
        source: StoreError,
    },
}
