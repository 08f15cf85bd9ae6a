//! Dictionary stage.
//!
//! Asks the chat model for a short developer-facing description of every
//! cataloged column and upserts the replies into the dictionary. Re-runs
//! overwrite earlier descriptions, so a second pass converges instead of
//! duplicating.

use std::sync::Arc;

use async_trait::async_trait;

use sift_core::{ColumnMeta, StageError, StageKind};
use sift_llm::{ChatProvider, ChatRequest};
use sift_pipeline::TableStage;
use sift_store::Store;

/// Second pipeline stage: describe each cataloged column.
#[derive(Clone)]
pub struct DictionaryAgent {
    store: Store,
    chat: Arc<dyn ChatProvider>,
}

impl DictionaryAgent {
    pub fn new(store: Store, chat: Arc<dyn ChatProvider>) -> Self {
        Self { store, chat }
    }
}

/// The per-column description prompt.
pub fn column_prompt(table: &str, column: &ColumnMeta) -> String {
    format!(
        "Describe the following database column in a brief, developer-friendly way:\n\
         Table: {table}\n\
         Column: {column_name}\n\
         Data Type: {data_type}\n\
         Include typical use cases or units if applicable.",
        column_name = column.column_name,
        data_type = column.data_type,
    )
}

#[async_trait]
impl TableStage for DictionaryAgent {
    fn kind(&self) -> StageKind {
        StageKind::Dictionary
    }

    async fn execute(&self, table: &str) -> Result<(), StageError> {
        let columns = self.store.columns_for_table(table).await?;

        for column in &columns {
            let request =
                ChatRequest::user_prompt(column_prompt(table, column)).with_temperature(0.2);
            let reply = self.chat.complete(request).await?;
            self.store
                .upsert_column_description(column.id, reply.trim())
                .await?;
        }

        tracing::debug!(table, count = columns.len(), "Column descriptions refreshed");
        Ok(())
    }
}
