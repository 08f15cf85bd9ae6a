#![cfg(feature = "db-tests")]

//! DB-backed smoke tests running the real stages against Postgres.
//!
//! Require a reachable Postgres (`SIFT_DATABASE_URL` or the `SIFT_DB_*`
//! variables) and run only with `--features db-tests`. Completions come
//! from a scripted provider, so no API key is needed.

use std::sync::Arc;

use serde_json::json;
use sift_agents::{standard_stage_set, QueryRunner, SchemaExtractor};
use sift_core::{ChartKind, SiftError};
use sift_llm::{ChatProvider, StaticChat};
use sift_pipeline::TableStage;
use sift_store::{Store, StoreConfig};

fn test_store() -> Result<Store, SiftError> {
    Ok(Store::from_config(&StoreConfig::from_env())?)
}

async fn seed_orders(store: &Store, table: &str) -> Result<(), SiftError> {
    store.drop_table(table).await?;
    store
        .execute_ddl(&format!(
            "CREATE TABLE \"{table}\" (amount DOUBLE PRECISION, placed_at TIMESTAMP, status TEXT);
             INSERT INTO \"{table}\" VALUES (10.5, '2024-01-01 09:30:00', 'paid');
             INSERT INTO \"{table}\" VALUES (19.25, '2024-01-02 10:00:00', 'refunded');"
        ))
        .await?;
    Ok(())
}

#[tokio::test]
async fn smoke_test_stage_sequence_builds_catalog_and_metrics() -> Result<(), SiftError> {
    let store = test_store()?;
    store.ensure_schema().await?;

    let table = "dbtest_pipe_orders";
    seed_orders(&store, table).await?;

    let chat = Arc::new(StaticChat::new([
        "Gross order value in USD.",
        "When the order was placed.",
        "Payment status of the order.",
    ]));
    let provider: Arc<dyn ChatProvider> = chat.clone();

    for stage in standard_stage_set(&store, &provider).in_order() {
        stage.execute(table).await?;
    }

    // Extractor: all three columns cataloged with type flags.
    let columns = store.columns_for_table(table).await?;
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0].column_name, "amount");
    assert!(columns[0].is_numeric);
    assert!(columns[1].is_datetime);
    assert!(!columns[2].is_numeric && !columns[2].is_datetime);

    // Dictionary: one completion per column, prompts name the column.
    assert_eq!(chat.remaining(), 0);
    let requests = chat.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].temperature, Some(0.2));
    assert!(requests[0].messages[0].content.contains("Table: dbtest_pipe_orders"));
    assert!(requests[0].messages[0].content.contains("Column: amount"));

    let described: Vec<String> = store
        .full_catalog()
        .await?
        .into_iter()
        .filter(|entry| entry.column.table_name == table)
        .filter_map(|entry| entry.description)
        .collect();
    assert_eq!(
        described,
        vec![
            "Gross order value in USD.",
            "When the order was placed.",
            "Payment status of the order.",
        ]
    );

    // Analyst: two numeric metrics plus one per remaining column.
    let metrics: Vec<_> = store
        .list_metrics()
        .await?
        .into_iter()
        .filter(|metric| metric.metric_name.starts_with("dbtest_pipe_orders."))
        .collect();
    assert_eq!(metrics.len(), 4);

    let names: Vec<&str> = metrics.iter().map(|m| m.metric_name.as_str()).collect();
    assert!(names.contains(&"dbtest_pipe_orders.amount_sum"));
    assert!(names.contains(&"dbtest_pipe_orders.amount_avg"));
    assert!(names.contains(&"dbtest_pipe_orders.placed_at_count_per_day"));
    assert!(names.contains(&"dbtest_pipe_orders.status_distinct_count"));

    // The stored SQL actually runs against the loaded rows.
    let sum = metrics
        .iter()
        .find(|m| m.metric_name == "dbtest_pipe_orders.amount_sum")
        .unwrap();
    assert_eq!(sum.viz_hint.kind, ChartKind::Numeric);
    assert_eq!(sum.viz_hint.y.as_deref(), Some("sum_amount"));
    let rows = store.execute_sql(&sum.sql_definition).await?;
    assert_eq!(rows, vec![json!({"sum_amount": 29.75})]);

    let categories = metrics
        .iter()
        .find(|m| m.metric_name == "dbtest_pipe_orders.status_distinct_count")
        .unwrap();
    assert_eq!(store.execute_sql(&categories.sql_definition).await?.len(), 2);

    store.drop_table(table).await?;
    println!("✅ Stage sequence smoke test passed");
    Ok(())
}

#[tokio::test]
async fn smoke_test_query_runner_answers_and_reports_sql_errors() -> Result<(), SiftError> {
    let store = test_store()?;
    store.ensure_schema().await?;

    let table = "dbtest_pipe_query";
    seed_orders(&store, table).await?;

    let chat = Arc::new(StaticChat::new([
        format!("```sql\nSELECT COUNT(*) AS n FROM \"{table}\"\n```"),
        "SELECT 1 FROM missing_table_nowhere".to_string(),
    ]));
    let provider: Arc<dyn ChatProvider> = chat.clone();

    // Catalog context for the prompt comes from the extractor.
    SchemaExtractor::new(store.clone()).execute(table).await?;

    let runner = QueryRunner::new(store.clone(), provider);

    let answered = runner.answer("How many orders are there?").await?;
    assert_eq!(answered.sql, format!("SELECT COUNT(*) AS n FROM \"{table}\""));
    assert_eq!(answered.data, Some(vec![json!({"n": 2})]));
    assert!(answered.error.is_none());

    let requests = chat.requests();
    assert_eq!(requests[0].temperature, Some(0.0));
    assert_eq!(requests[0].messages[0].role, "system");
    assert!(requests[0].messages[0].content.contains("- dbtest_pipe_query.amount (double precision)"));
    assert_eq!(requests[0].messages[1].content, "How many orders are there?");

    // A failing statement surfaces in the outcome, not as an Err.
    let failed = runner.answer("Something unanswerable").await?;
    assert!(failed.data.is_none());
    assert!(failed.error.as_deref().unwrap_or("").contains("missing_table_nowhere"));

    store.drop_table(table).await?;
    println!("✅ Query runner smoke test passed");
    Ok(())
}
