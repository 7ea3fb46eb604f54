//! Writes one metadata row per changed object.

use crate::{
    errors::RecordError,
    models::{object::ObjectDescriptor, record::MetadataRecord},
    services::{
        object_store::Provisioned,
        table_store::{TableResult, TableStore},
    },
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

pub struct MetadataRecorder {
    tables: Arc<dyn TableStore>,
    table: String,
    op_timeout: Duration,
}

impl MetadataRecorder {
    pub fn new(tables: Arc<dyn TableStore>, table: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            tables,
            table: table.into(),
            op_timeout,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the metadata table if it is missing.
    pub async fn ensure_table(&self) -> TableResult<Provisioned> {
        self.tables.create_table(&self.table).await
    }

    /// Upsert the row for `descriptor` under partition `container`.
    pub async fn record(
        &self,
        descriptor: &ObjectDescriptor,
        container: &str,
    ) -> Result<(), RecordError> {
        let key = &descriptor.key;
        let serialize_err = |source| RecordError::Serialize {
            key: key.clone(),
            source,
        };
        let record = MetadataRecord::from_descriptor(container, descriptor).map_err(serialize_err)?;
        let fields = record.fields().map_err(serialize_err)?;

        match timeout(
            self.op_timeout,
            self.tables
                .upsert_row(&self.table, &record.partition_key, &record.row_key, &fields),
        )
        .await
        {
            Ok(result) => result.map_err(|source| RecordError::Table {
                key: key.clone(),
                source,
            }),
            Err(_) => Err(RecordError::TimedOut {
                key: key.clone(),
                timeout: self.op_timeout,
            }),
        }
    }
}
