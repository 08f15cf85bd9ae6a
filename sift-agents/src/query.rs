//! Natural-language query runner.
//!
//! Turns a question into SQL with the chat provider, grounded in the
//! column catalog, then executes it read-only through the store. SQL
//! failures are reported in the outcome rather than bubbled up, so
//! callers always see which statement was attempted.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sift_core::{CatalogColumn, SiftError};
use sift_llm::{ChatMessage, ChatProvider, ChatRequest};
use sift_store::Store;

/// First fenced ```sql block in a completion.
static SQL_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```sql\s*(.*?)```").expect("Invalid SQL fence regex"));

/// Pulls the SQL out of a completion. Providers are asked to fence the
/// statement, but when none reply with a fence the whole completion is
/// treated as SQL.
pub fn extract_sql(reply: &str) -> String {
    match SQL_FENCE.captures(reply).and_then(|caps| caps.get(1)) {
        Some(sql) => sql.as_str().trim().to_string(),
        None => reply.trim().to_string(),
    }
}

/// Schema context handed to the provider, one line per column.
pub fn catalog_prompt(catalog: &[CatalogColumn]) -> String {
    let mut prompt = String::from(
        "You are a PostgreSQL analyst. Convert the user's question into a single \
         SQL query against the schema below.\n\nSchema:\n",
    );
    for entry in catalog {
        let description = entry.description.as_deref().unwrap_or("no description");
        prompt.push_str(&format!(
            "- {}.{} ({}): {}\n",
            entry.column.table_name, entry.column.column_name, entry.column.data_type, description
        ));
    }
    prompt.push_str("\nReply with the SQL inside a ```sql fenced block.");
    prompt
}

/// What a question produced: the generated SQL, plus either rows or the
/// execution error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answers ad-hoc questions against ingested tables.
#[derive(Clone)]
pub struct QueryRunner {
    store: Store,
    chat: Arc<dyn ChatProvider>,
}

impl QueryRunner {
    pub fn new(store: Store, chat: Arc<dyn ChatProvider>) -> Self {
        Self { store, chat }
    }

    /// Generates SQL for `question` and runs it. A failing statement is
    /// not an error at this level: the outcome carries the database's
    /// message so the caller can show what went wrong with which SQL.
    pub async fn answer(&self, question: &str) -> Result<QueryOutcome, SiftError> {
        let catalog = self.store.full_catalog().await?;

        let request = ChatRequest::new(vec![
            ChatMessage::system(catalog_prompt(&catalog)),
            ChatMessage::user(question),
        ])
        .with_temperature(0.0);

        let reply = self.chat.complete(request).await?;
        let sql = extract_sql(&reply);

        match self.store.execute_sql(&sql).await {
            Ok(rows) => Ok(QueryOutcome {
                sql,
                data: Some(rows),
                error: None,
            }),
            Err(err) => {
                tracing::warn!(%sql, %err, "Generated SQL failed");
                Ok(QueryOutcome {
                    sql,
                    data: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }
}


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
