//! The object store contract the scanner is written against.
//!
//! Both the source and the target container live behind one `ObjectStore`,
//! mirroring a storage account that hosts several containers.

use crate::models::{
    grant::ReadGrant,
    object::{ObjectDescriptor, ObjectProperties},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container `{0}` not found")]
    ContainerNotFound(String),
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("object `{key}` not found in container `{container}`")]
    ObjectNotFound { container: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("read grant rejected: {0}")]
    GrantRejected(&'static str),
    #[error("stored metadata is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an idempotent create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// What a successful copy produced on the target side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub bytes: u64,
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerate every object in `container` in the store's native order.
    ///
    /// The stream is single-pass and not restartable. Any failure to fetch
    /// part of the listing is yielded as an `Err` and ends the stream.
    fn list_objects<'a>(&'a self, container: &'a str)
    -> BoxStream<'a, StoreResult<ObjectDescriptor>>;

    async fn read_object(&self, container: &str, key: &str) -> StoreResult<Bytes>;

    /// Write `data` under `key`, replacing any existing object.
    async fn write_object(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        properties: ObjectProperties,
    ) -> StoreResult<ObjectDescriptor>;

    async fn object_exists(&self, container: &str, key: &str) -> StoreResult<bool>;

    async fn create_container(&self, container: &str) -> StoreResult<Provisioned>;

    /// Issue a read-only grant for one object, valid for `ttl`.
    fn sign_read(&self, container: &str, key: &str, ttl: Duration) -> StoreResult<ReadGrant>;

    /// Copy the object named by `grant` to `target_container/target_key`,
    /// overwriting the target. Content properties and metadata are preserved.
    async fn copy_from_grant(
        &self,
        grant: &ReadGrant,
        target_container: &str,
        target_key: &str,
    ) -> StoreResult<CopyOutcome>;
}
