//! src/services/local_store.rs
//!
//! LocalObjectStore — an `ObjectStore` backed by SQLite for object properties
//! and local disk for payloads. Payloads are sharded beneath
//! `base_path/{container}/{aa}/{bb}/{digest}` where the digest is the MD5 of
//! `container/key`, so nested keys never collide with each other on disk.

use crate::{
    models::{
        grant::ReadGrant,
        object::{ContentSettings, ObjectDescriptor, ObjectProperties},
    },
    services::{
        grant_signer::GrantSigner,
        object_store::{CopyOutcome, ObjectStore, Provisioned, StoreError, StoreResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{
    Stream, StreamExt, TryStreamExt, pin_mut,
    stream::{self, BoxStream},
};
use md5::Context;
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;
pub const DEFAULT_PAGE_SIZE: usize = 500;

const OBJECT_COLUMNS: &str = "key, size_bytes, content_type, content_encoding, content_language, \
     content_disposition, cache_control, content_md5, etag, created_at, last_modified, metadata";

/// Raw `objects` row. Timestamps stay as text here so that a garbled value
/// degrades to "no timestamp" instead of failing the whole listing.
#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    size_bytes: i64,
    content_type: Option<String>,
    content_encoding: Option<String>,
    content_language: Option<String>,
    content_disposition: Option<String>,
    cache_control: Option<String>,
    content_md5: Option<Vec<u8>>,
    etag: Option<String>,
    created_at: Option<String>,
    last_modified: Option<String>,
    metadata: String,
}

impl ObjectRow {
    fn into_descriptor(self) -> StoreResult<ObjectDescriptor> {
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)?;
        Ok(ObjectDescriptor {
            last_modified: parse_timestamp(&self.key, "last_modified", self.last_modified),
            created_at: parse_timestamp(&self.key, "created_at", self.created_at),
            size: u64::try_from(self.size_bytes).unwrap_or(0),
            etag: self.etag,
            content_md5: self.content_md5,
            content: ContentSettings {
                content_type: self.content_type,
                content_encoding: self.content_encoding,
                content_language: self.content_language,
                content_disposition: self.content_disposition,
                cache_control: self.cache_control,
            },
            metadata,
            key: self.key,
        })
    }
}

fn parse_timestamp(key: &str, column: &str, raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(err) => {
            warn!("object `{}` has unparseable {} `{}`: {}", key, column, raw, err);
            None
        }
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Removes a partially written payload unless it was renamed into place.
/// Dropping the guard covers early returns and cancelled futures alike.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != ErrorKind::NotFound
        {
            warn!("failed to remove temp file {}: {}", self.path.display(), err);
        }
    }
}

/// LocalObjectStore provides the container operations the scanner needs:
/// - paginated, lazy listing (query SQLite by key)
/// - streaming writes (bytes to disk, properties to SQLite)
/// - reads, existence checks and idempotent container creation
/// - server-side copies authorised by signed read grants
#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for object properties.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    signer: GrantSigner,
    page_size: usize,
}

impl LocalObjectStore {
    /// Create a store backed by `db`, keeping payloads under `base_path` and
    /// signing grants with `signer`.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, signer: GrantSigner) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Number of rows fetched per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Basic key validation.
    ///
    /// Rejects empty or oversized keys, leading `/`, empty or relative path
    /// segments, and control characters.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = || StoreError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }
        if key.chars().any(|c| c.is_control() || c == '\\') {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate container name format.
    ///
    /// - 3–63 characters
    /// - lowercase letters, digits and hyphens only
    /// - must start and end with a letter or digit
    /// - no consecutive hyphens
    fn ensure_container_name_safe(&self, name: &str) -> StoreResult<()> {
        let reject = |reason: &str| {
            Err(StoreError::InvalidContainerName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
            return reject("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
        {
            return reject("allowed characters are lowercase letters, digits, and hyphens");
        }
        if name.starts_with('-') || name.ends_with('-') {
            return reject("must start and end with a lowercase letter or digit");
        }
        if name.contains("--") {
            return reject("cannot contain consecutive hyphens");
        }
        Ok(())
    }

    /// Compute the physical base folder path for a container.
    fn container_root(&self, container: &str) -> PathBuf {
        self.base_path.join(container)
    }

    /// Construct the payload path for an object.
    ///
    /// Uses MD5(container/key): the first two bytes pick the shard
    /// directories, the full hex digest names the file.
    fn object_path(&self, container: &str, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", container, key));
        let mut path = self.container_root(container);
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    /// Returns ContainerNotFound if the container was never created.
    async fn fetch_container(&self, container: &str) -> StoreResult<()> {
        self.ensure_container_name_safe(container)?;
        sqlx::query_scalar::<_, String>("SELECT name FROM containers WHERE name = ?")
            .bind(container)
            .fetch_optional(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))
    }

    async fn fetch_object(&self, container: &str, key: &str) -> StoreResult<ObjectDescriptor> {
        self.ensure_key_safe(key)?;
        self.fetch_container(container).await?;
        let row = sqlx::query_as::<_, ObjectRow>(&format!(
            "SELECT {} FROM objects WHERE container = ? AND key = ?",
            OBJECT_COLUMNS
        ))
        .bind(container)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::ObjectNotFound {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        row.into_descriptor()
    }

    /// Fetch one listing page of objects with keys strictly after `after`.
    ///
    /// Returns the page plus the cursor for the next page, or `None` once the
    /// container is exhausted.
    async fn fetch_page(
        &self,
        container: &str,
        after: Option<&str>,
    ) -> StoreResult<(Vec<ObjectDescriptor>, Option<String>)> {
        self.fetch_container(container).await?;
        let fetch_limit = self.page_size + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM objects WHERE container = ",
            OBJECT_COLUMNS
        ));
        builder.push_bind(container);
        if let Some(after) = after {
            builder.push(" AND key > ");
            builder.push_bind(after);
        }
        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<ObjectRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next = rows.last().map(|row| row.key.clone());
        }

        let page = rows
            .into_iter()
            .map(ObjectRow::into_descriptor)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((page, next))
    }

    /// Stream an object to disk and upsert its properties.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5 and size while streaming.
    /// - Renames into the final location.
    /// - Upserts the properties row, keeping the original creation time.
    ///
    /// The temp file is removed on errors and when the future is dropped
    /// before the rename.
    async fn write_stream<S>(
        &self,
        container: &str,
        key: &str,
        properties: &ObjectProperties,
        stream: S,
    ) -> StoreResult<ObjectDescriptor>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        self.fetch_container(container).await?;
        let metadata = serde_json::to_string(&properties.metadata)?;

        let file_path = self.object_path(container, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp = TempFile::new(parent.join(format!(".tmp-{}", Uuid::new_v4())));
        let mut file = File::create(tmp.path()).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(tmp.path(), &file_path).await {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(StoreError::Io(err));
            }
            fs::remove_file(&file_path).await?;
            fs::rename(tmp.path(), &file_path).await?;
        }
        tmp.disarm();

        let md5 = digest.compute();
        let now = format_timestamp(Utc::now());
        let content = &properties.content;

        let row = sqlx::query_as::<_, ObjectRow>(&format!(
            r#"
            INSERT INTO objects (
                id, container, key, size_bytes, content_type, content_encoding,
                content_language, content_disposition, cache_control, content_md5,
                etag, created_at, last_modified, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(container, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                content_type = excluded.content_type,
                content_encoding = excluded.content_encoding,
                content_language = excluded.content_language,
                content_disposition = excluded.content_disposition,
                cache_control = excluded.cache_control,
                content_md5 = excluded.content_md5,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                metadata = excluded.metadata
            RETURNING {}
            "#,
            OBJECT_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(container)
        .bind(key)
        .bind(size_bytes)
        .bind(content.content_type.as_deref())
        .bind(content.content_encoding.as_deref())
        .bind(content.content_language.as_deref())
        .bind(content.content_disposition.as_deref())
        .bind(content.cache_control.as_deref())
        .bind(md5.0.to_vec())
        .bind(format!("{:x}", md5))
        .bind(&now)
        .bind(&now)
        .bind(metadata)
        .fetch_one(&*self.db)
        .await;

        match row {
            Ok(row) => row.into_descriptor(),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn list_objects<'a>(
        &'a self,
        container: &'a str,
    ) -> BoxStream<'a, StoreResult<ObjectDescriptor>> {
        // State: None once exhausted, Some(cursor) while pages remain.
        stream::try_unfold(Some(None::<String>), move |cursor| async move {
            let Some(after) = cursor else {
                return Ok(None);
            };
            let (page, next) = self.fetch_page(container, after.as_deref()).await?;
            debug!(
                "listed page of {} objects from `{}` (more: {})",
                page.len(),
                container,
                next.is_some()
            );
            Ok::<_, StoreError>(Some((page, next.map(Some))))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn read_object(&self, container: &str, key: &str) -> StoreResult<Bytes> {
        self.fetch_object(container, key).await?;
        let file_path = self.object_path(container, key);
        match fs::read(&file_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::ObjectNotFound {
                container: container.to_string(),
                key: key.to_string(),
            }),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn write_object(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        properties: ObjectProperties,
    ) -> StoreResult<ObjectDescriptor> {
        let body = stream::once(async move { Ok::<_, io::Error>(data) });
        self.write_stream(container, key, &properties, body).await
    }

    async fn object_exists(&self, container: &str, key: &str) -> StoreResult<bool> {
        self.ensure_key_safe(key)?;
        self.fetch_container(container).await?;
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM objects WHERE container = ? AND key = ?",
        )
        .bind(container)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(found.is_some())
    }

    /// Create a container and its directory. An existing container is
    /// reported as `AlreadyExists`, not as an error.
    async fn create_container(&self, container: &str) -> StoreResult<Provisioned> {
        self.ensure_container_name_safe(container)?;
        fs::create_dir_all(self.container_root(container)).await?;

        match sqlx::query("INSERT INTO containers (name, created_at) VALUES (?, ?)")
            .bind(container)
            .bind(format_timestamp(Utc::now()))
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(Provisioned::Created),
            Err(err) if is_unique_violation(&err) => Ok(Provisioned::AlreadyExists),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    fn sign_read(&self, container: &str, key: &str, ttl: Duration) -> StoreResult<ReadGrant> {
        self.ensure_container_name_safe(container)?;
        self.ensure_key_safe(key)?;
        Ok(self.signer.sign_read(container, key, Utc::now(), ttl))
    }

    async fn copy_from_grant(
        &self,
        grant: &ReadGrant,
        target_container: &str,
        target_key: &str,
    ) -> StoreResult<CopyOutcome> {
        self.signer
            .verify(grant, Utc::now())
            .map_err(|rejection| StoreError::GrantRejected(rejection.as_str()))?;

        let source = self.fetch_object(&grant.container, &grant.key).await?;
        let file = File::open(self.object_path(&grant.container, &grant.key))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    StoreError::ObjectNotFound {
                        container: grant.container.clone(),
                        key: grant.key.clone(),
                    }
                } else {
                    StoreError::Io(err)
                }
            })?;

        let written = self
            .write_stream(
                target_container,
                target_key,
                &source.properties(),
                ReaderStream::new(file),
            )
            .await?;

        Ok(CopyOutcome {
            bytes: written.size,
            etag: written.etag,
        })
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::memory_pool;
    use tempfile::TempDir;

    pub(crate) async fn store(dir: &TempDir) -> LocalObjectStore {
        let db = Arc::new(memory_pool().await);
        LocalObjectStore::new(db, dir.path(), GrantSigner::new("test-account-key"))
    }

    fn text(content_type: &str) -> ObjectProperties {
        ObjectProperties {
            content: ContentSettings {
                content_type: Some(content_type.into()),
                ..Default::default()
            },
            metadata: BTreeMap::from([("origin".to_string(), "test".to_string())]),
        }
    }

    #[tokio::test]
    async fn create_container_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        assert_eq!(
            store.create_container("input").await.unwrap(),
            Provisioned::Created
        );
        assert_eq!(
            store.create_container("input").await.unwrap(),
            Provisioned::AlreadyExists
        );
        assert!(matches!(
            store.create_container("Bad_Name").await,
            Err(StoreError::InvalidContainerName { .. })
        ));
    }

    #[tokio::test]
    async fn write_then_read_preserves_content_and_properties() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();

        let written = store
            .write_object("input", "docs/a.txt", Bytes::from_static(b"hello"), text("text/plain"))
            .await
            .unwrap();
        assert_eq!(written.size, 5);
        assert_eq!(written.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert!(written.last_modified.is_some());
        assert_eq!(written.created_at, written.last_modified);

        let data = store.read_object("input", "docs/a.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert!(store.object_exists("input", "docs/a.txt").await.unwrap());
        assert!(!store.object_exists("input", "docs/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_keeps_creation_time() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();

        let first = store
            .write_object("input", "a.txt", Bytes::from_static(b"v1"), text("text/plain"))
            .await
            .unwrap();
        let second = store
            .write_object("input", "a.txt", Bytes::from_static(b"v2-longer"), text("text/plain"))
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_modified >= first.last_modified);
        assert_eq!(second.size, 9);
        assert_eq!(
            &store.read_object("input", "a.txt").await.unwrap()[..],
            b"v2-longer"
        );
    }

    #[tokio::test]
    async fn nested_and_flat_keys_coexist() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();
        for key in ["a", "a/b"] {
            store
                .write_object("input", key, Bytes::from(key.to_string()), text("text/plain"))
                .await
                .unwrap();
        }
        assert_eq!(&store.read_object("input", "a").await.unwrap()[..], b"a");
        assert_eq!(&store.read_object("input", "a/b").await.unwrap()[..], b"a/b");
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_missing_containers() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();
        for key in ["", "/abs", "a/../b", "a//b", "tab\tkey"] {
            assert!(matches!(
                store
                    .write_object("input", key, Bytes::new(), ObjectProperties::default())
                    .await,
                Err(StoreError::InvalidObjectKey(_))
            ));
        }
        assert!(matches!(
            store
                .write_object("missing", "a.txt", Bytes::new(), ObjectProperties::default())
                .await,
            Err(StoreError::ContainerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_walks_every_page_in_key_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await.with_page_size(2);
        store.create_container("input").await.unwrap();
        for key in ["e", "a", "c", "b", "d"] {
            store
                .write_object("input", key, Bytes::from_static(b"x"), ObjectProperties::default())
                .await
                .unwrap();
        }

        let keys: Vec<String> = store
            .list_objects("input")
            .map_ok(|desc| desc.key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn listing_a_missing_container_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let result: StoreResult<Vec<ObjectDescriptor>> =
            store.list_objects("missing").try_collect().await;
        assert!(matches!(result, Err(StoreError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn garbled_timestamps_list_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();
        store
            .write_object("input", "a.txt", Bytes::from_static(b"x"), ObjectProperties::default())
            .await
            .unwrap();
        sqlx::query("UPDATE objects SET last_modified = 'yesterday-ish' WHERE key = 'a.txt'")
            .execute(&*store.db)
            .await
            .unwrap();

        let listed: Vec<ObjectDescriptor> = store.list_objects("input").try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].last_modified, None);
    }

    #[tokio::test]
    async fn copy_from_grant_duplicates_object() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();
        store.create_container("output").await.unwrap();
        let source = store
            .write_object("input", "x/y.csv", Bytes::from_static(b"1,2,3"), text("text/csv"))
            .await
            .unwrap();

        let grant = store
            .sign_read("input", "x/y.csv", Duration::from_secs(3600))
            .unwrap();
        let outcome = store.copy_from_grant(&grant, "output", "x/y.csv").await.unwrap();
        assert_eq!(outcome.bytes, 5);
        assert_eq!(outcome.etag, source.etag);

        assert_eq!(
            &store.read_object("output", "x/y.csv").await.unwrap()[..],
            b"1,2,3"
        );
        let copied: Vec<ObjectDescriptor> = store.list_objects("output").try_collect().await.unwrap();
        assert_eq!(copied[0].content.content_type.as_deref(), Some("text/csv"));
        assert_eq!(copied[0].metadata.get("origin").map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn copy_rejects_expired_or_foreign_grants() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("input").await.unwrap();
        store.create_container("output").await.unwrap();
        store
            .write_object("input", "a.txt", Bytes::from_static(b"x"), ObjectProperties::default())
            .await
            .unwrap();

        let expired = store.sign_read("input", "a.txt", Duration::ZERO).unwrap();
        assert!(matches!(
            store.copy_from_grant(&expired, "output", "a.txt").await,
            Err(StoreError::GrantRejected(_))
        ));

        let foreign = GrantSigner::new("someone-else").sign_read(
            "input",
            "a.txt",
            Utc::now(),
            Duration::from_secs(3600),
        );
        assert!(matches!(
            store.copy_from_grant(&foreign, "output", "a.txt").await,
            Err(StoreError::GrantRejected(_))
        ));
        assert!(!store.object_exists("output", "a.txt").await.unwrap());
    }

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else if path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(".tmp-"))
                {
                    found.push(path);
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn abandoned_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("output").await.unwrap();

        let body = stream::iter([Ok(Bytes::from_static(b"partial"))]).chain(stream::pending());
        let props = ObjectProperties::default();
        let write = store.write_stream("output", "a.txt", &props, body);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), write)
                .await
                .is_err()
        );

        assert!(temp_files(dir.path()).is_empty());
        assert!(!store.object_exists("output", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn failed_body_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.create_container("output").await.unwrap();

        let body = stream::iter([
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::BrokenPipe, "source went away")),
        ]);
        assert!(matches!(
            store
                .write_stream("output", "a.txt", &ObjectProperties::default(), body)
                .await,
            Err(StoreError::Io(_))
        ));
        assert!(temp_files(dir.path()).is_empty());
    }
}
