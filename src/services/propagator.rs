//! Copies changed objects from the source to the target container.

use crate::{
    errors::CopyError,
    models::object::ObjectDescriptor,
    services::object_store::{CopyOutcome, ObjectStore, Provisioned, StoreResult},
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

/// Lifetime of the read grant handed to each copy.
pub const DEFAULT_GRANT_TTL: Duration = Duration::from_secs(60 * 60);

pub struct CopyPropagator {
    store: Arc<dyn ObjectStore>,
    source: String,
    target: String,
    grant_ttl: Duration,
    op_timeout: Duration,
}

impl CopyPropagator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: impl Into<String>,
        target: impl Into<String>,
        grant_ttl: Duration,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source: source.into(),
            target: target.into(),
            grant_ttl,
            op_timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Create the target container if it is missing.
    pub async fn ensure_target(&self) -> StoreResult<Provisioned> {
        self.store.create_container(&self.target).await
    }

    /// Copy one object to the same key in the target container, replacing
    /// whatever is there. Bounded by the per-operation timeout; no retries.
    /// A copy that outlives the timeout is reported as failed but still runs
    /// to completion in the background.
    pub async fn copy(&self, descriptor: &ObjectDescriptor) -> Result<CopyOutcome, CopyError> {
        let key = &descriptor.key;
        let grant = self
            .store
            .sign_read(&self.source, key, self.grant_ttl)
            .map_err(|source| CopyError::Grant {
                key: key.clone(),
                source,
            })?;

        // Spawned so a timeout detaches the copy instead of cancelling it mid-write.
        let store = Arc::clone(&self.store);
        let target = self.target.clone();
        let object_key = key.clone();
        let copy = tokio::spawn(async move {
            store.copy_from_grant(&grant, &target, &object_key).await
        });

        match timeout(self.op_timeout, copy).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(source))) => Err(CopyError::Store {
                key: key.clone(),
                source,
            }),
            Ok(Err(source)) => Err(CopyError::Task {
                key: key.clone(),
                source,
            }),
            Err(_) => Err(CopyError::TimedOut {
                key: key.clone(),
                timeout: self.op_timeout,
            }),
        }
    }
}
