//! Schema extraction stage.
//!
//! Reads a table's physical columns out of Postgres and replaces its
//! catalog rows, classifying each column for the analyst downstream.

use async_trait::async_trait;

use sift_core::{NewColumnMeta, StageError, StageKind};
use sift_pipeline::TableStage;
use sift_store::Store;

/// First pipeline stage: catalog the physical schema of a table.
#[derive(Clone)]
pub struct SchemaExtractor {
    store: Store,
}

impl SchemaExtractor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

/// Whether a Postgres type name counts as numeric for metric synthesis.
pub fn is_numeric_type(data_type: &str) -> bool {
    let data_type = data_type.to_lowercase();
    data_type.contains("int") || data_type.contains("double") || data_type.contains("numeric")
}

/// Whether a Postgres type name counts as a date or time column.
pub fn is_datetime_type(data_type: &str) -> bool {
    let data_type = data_type.to_lowercase();
    data_type.contains("date") || data_type.contains("time")
}

#[async_trait]
impl TableStage for SchemaExtractor {
    fn kind(&self) -> StageKind {
        StageKind::Extractor
    }

    async fn execute(&self, table: &str) -> Result<(), StageError> {
        let physical = self.store.table_columns(table).await?;
        if physical.is_empty() {
            return Err(StageError::failed(format!(
                "Table {table} has no columns to extract"
            )));
        }

        let columns: Vec<NewColumnMeta> = physical
            .into_iter()
            .map(|(column_name, data_type)| NewColumnMeta {
                table_name: table.to_string(),
                column_name,
                is_numeric: is_numeric_type(&data_type),
                is_datetime: is_datetime_type(&data_type),
                data_type,
            })
            .collect();

        let count = columns.len();
        self.store.replace_column_meta(table, &columns).await?;
        tracing::debug!(table, count, "Extracted column metadata");
        Ok(())
    }
}
