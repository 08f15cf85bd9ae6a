//! Sift agents.
//!
//! The three pipeline stages that run per ingested table, in order:
//!
//! - [`SchemaExtractor`] reads the physical schema into the catalog
//! - [`DictionaryAgent`] asks the chat model to describe each column
//! - [`AnalystAgent`] derives heuristic metrics from described columns
//!
//! plus [`QueryRunner`], which turns natural-language questions into SQL
//! against the cataloged tables.

use std::sync::Arc;

use sift_llm::ChatProvider;
use sift_pipeline::StageSet;
use sift_store::Store;

pub mod analyst;
pub mod dictionary;
pub mod extractor;
pub mod query;

pub use analyst::AnalystAgent;
pub use dictionary::DictionaryAgent;
pub use extractor::SchemaExtractor;
pub use query::{QueryOutcome, QueryRunner};

/// The standard extractor, dictionary, analyst stage set over one store
/// and one chat provider.
pub fn standard_stage_set(store: &Store, chat: &Arc<dyn ChatProvider>) -> StageSet {
    StageSet::new(
        Arc::new(SchemaExtractor::new(store.clone())),
        Arc::new(DictionaryAgent::new(store.clone(), Arc::clone(chat))),
        Arc::new(AnalystAgent::new(store.clone())),
    )
}
