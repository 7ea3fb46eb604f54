//! Metadata table contract and its SQLite implementation.
//!
//! Rows are addressed by `(table, partition key, row key)` and carry a JSON
//! object of fields. Upserts replace the whole field set.

use crate::services::object_store::Provisioned;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

const TABLE_NAME_MIN_LEN: usize = 3;
const TABLE_NAME_MAX_LEN: usize = 63;
const MAX_KEY_LEN: usize = 1024;

pub type TableRow = Map<String, Value>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table `{0}` not found")]
    TableNotFound(String),
    #[error("table `{name}` invalid: {reason}")]
    InvalidTableName { name: String, reason: String },
    #[error("invalid {kind} `{value}`: {reason}")]
    InvalidKey {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("row fields are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TableResult<T> = Result<T, TableError>;

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn create_table(&self, table: &str) -> TableResult<Provisioned>;

    /// Insert the row, or replace every field of an existing one.
    async fn upsert_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: &TableRow,
    ) -> TableResult<()>;

    async fn get_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> TableResult<Option<TableRow>>;
}

#[derive(Clone)]
pub struct SqliteTableStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteTableStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Table names: 3–63 ASCII letters or digits, starting with a letter.
    fn ensure_table_name_safe(&self, name: &str) -> TableResult<()> {
        let reject = |reason: &str| {
            Err(TableError::InvalidTableName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };
        if !(TABLE_NAME_MIN_LEN..=TABLE_NAME_MAX_LEN).contains(&name.len()) {
            return reject("must be between 3 and 63 characters");
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return reject("allowed characters are letters and digits");
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return reject("must start with a letter");
        }
        Ok(())
    }

    /// Partition and row keys may not contain `/`, `\`, `#`, `?` or control
    /// characters.
    fn ensure_key_safe(&self, kind: &'static str, value: &str) -> TableResult<()> {
        let reject = |reason| {
            Err(TableError::InvalidKey {
                kind,
                value: value.to_string(),
                reason,
            })
        };
        if value.len() > MAX_KEY_LEN {
            return reject("longer than 1024 bytes");
        }
        if value
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
        {
            return reject("contains a disallowed character");
        }
        Ok(())
    }

    async fn ensure_table_exists(&self, table: &str) -> TableResult<()> {
        self.ensure_table_name_safe(table)?;
        sqlx::query_scalar::<_, String>("SELECT name FROM metadata_tables WHERE name = ?")
            .bind(table)
            .fetch_optional(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| TableError::TableNotFound(table.to_string()))
    }

    /// Number of rows stored under `partition_key`.
    #[cfg(test)]
    pub async fn count_partition(&self, table: &str, partition_key: &str) -> TableResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM table_rows WHERE table_name = ? AND partition_key = ?",
        )
        .bind(table)
        .bind(partition_key)
        .fetch_one(&*self.db)
        .await?)
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn create_table(&self, table: &str) -> TableResult<Provisioned> {
        self.ensure_table_name_safe(table)?;
        let result = sqlx::query(
            "INSERT INTO metadata_tables (name, created_at) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(table)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .execute(&*self.db)
        .await?;

        Ok(if result.rows_affected() == 0 {
            Provisioned::AlreadyExists
        } else {
            Provisioned::Created
        })
    }

    async fn upsert_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: &TableRow,
    ) -> TableResult<()> {
        self.ensure_key_safe("partition key", partition_key)?;
        self.ensure_key_safe("row key", row_key)?;
        self.ensure_table_exists(table).await?;

        sqlx::query(
            r#"
            INSERT INTO table_rows (table_name, partition_key, row_key, fields, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(table_name, partition_key, row_key) DO UPDATE SET
                fields = excluded.fields,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .bind(serde_json::to_string(fields)?)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn get_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> TableResult<Option<TableRow>> {
        self.ensure_table_exists(table).await?;
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT fields FROM table_rows
             WHERE table_name = ? AND partition_key = ? AND row_key = ?",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&*self.db)
        .await?;

        raw.map(|raw| serde_json::from_str::<TableRow>(&raw))
            .transpose()
            .map_err(TableError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use serde_json::json;

    async fn tables() -> SqliteTableStore {
        SqliteTableStore::new(Arc::new(memory_pool().await))
    }

    fn row(value: Value) -> TableRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn create_table_reports_existing() {
        let tables = tables().await;
        assert_eq!(
            tables.create_table("BlobMetadataTable").await.unwrap(),
            Provisioned::Created
        );
        assert_eq!(
            tables.create_table("BlobMetadataTable").await.unwrap(),
            Provisioned::AlreadyExists
        );
        assert!(matches!(
            tables.create_table("1bad").await,
            Err(TableError::InvalidTableName { .. })
        ));
    }

    #[tokio::test]
    async fn upsert_replaces_every_field() {
        let tables = tables().await;
        tables.create_table("Meta").await.unwrap();

        tables
            .upsert_row("Meta", "input", "a.txt", &row(json!({"BlobSize": 1, "Old": true})))
            .await
            .unwrap();
        tables
            .upsert_row("Meta", "input", "a.txt", &row(json!({"BlobSize": 2})))
            .await
            .unwrap();

        let stored = tables.get_row("Meta", "input", "a.txt").await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({"BlobSize": 2}));
        assert_eq!(tables.count_partition("Meta", "input").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_requires_table_and_valid_keys() {
        let tables = tables().await;
        assert!(matches!(
            tables.upsert_row("Meta", "input", "a.txt", &TableRow::new()).await,
            Err(TableError::TableNotFound(_))
        ));

        tables.create_table("Meta").await.unwrap();
        assert!(matches!(
            tables.upsert_row("Meta", "input", "dir/a.txt", &TableRow::new()).await,
            Err(TableError::InvalidKey { .. })
        ));
        assert_eq!(tables.get_row("Meta", "input", "missing").await.unwrap(), None);
    }
}
