#![cfg(feature = "db-tests")]

//! DB-backed tests for the three ingest modes.
//!
//! Require a reachable Postgres (`SIFT_DATABASE_URL` or the `SIFT_DB_*`
//! variables) and run only with `--features db-tests`.

use serde_json::json;
use sift_core::{IngestError, IngestMode};
use sift_ingest::Ingestor;
use sift_store::{Store, StoreConfig};

async fn test_ingestor() -> (Store, Ingestor) {
    let store = Store::from_config(&StoreConfig::from_env()).unwrap();
    store.ensure_schema().await.unwrap();
    (store.clone(), Ingestor::new(store))
}

#[tokio::test]
async fn smoke_test_create_suffixes_on_collision() {
    let (store, ingestor) = test_ingestor().await;
    store.drop_table("ing_create_orders").await.unwrap();
    store.drop_table("ing_create_orders_1").await.unwrap();

    let data = b"Qty,Unit Price,Day,Note\n1,9.99,2024-01-02,first\n2,1.5,2024-01-03,\n";

    let first = ingestor
        .ingest_file(
            "Ing Create Orders.csv",
            data,
            IngestMode::Create,
            None,
            "tester",
        )
        .await
        .unwrap();
    assert_eq!(first.table_name, "ing_create_orders");
    assert_eq!(first.row_count, 2);

    // Same file name again lands in a suffixed table.
    let second = ingestor
        .ingest_file(
            "Ing Create Orders.csv",
            data,
            IngestMode::Create,
            None,
            "tester",
        )
        .await
        .unwrap();
    assert_eq!(second.table_name, "ing_create_orders_1");

    let columns = store.table_columns("ing_create_orders").await.unwrap();
    assert_eq!(
        columns,
        vec![
            ("qty".to_string(), "bigint".to_string()),
            ("unit_price".to_string(), "double precision".to_string()),
            ("day".to_string(), "timestamp without time zone".to_string()),
            ("note".to_string(), "text".to_string()),
        ]
    );

    store.drop_table("ing_create_orders").await.unwrap();
    store.drop_table("ing_create_orders_1").await.unwrap();
    println!("✅ Create mode with collision suffix passed");
}

#[tokio::test]
async fn smoke_test_replace_swaps_schema_and_rows() {
    let (store, ingestor) = test_ingestor().await;
    store.drop_table("ing_replace_orders").await.unwrap();

    ingestor
        .ingest_file(
            "v1.csv",
            b"a,b\n1,2\n3,4\n",
            IngestMode::Replace,
            Some("ing_replace_orders"),
            "tester",
        )
        .await
        .unwrap();

    // Different shape entirely; replace must not care.
    let reloaded = ingestor
        .ingest_file(
            "v2.csv",
            b"name\nalpha\n",
            IngestMode::Replace,
            Some("ing_replace_orders"),
            "tester",
        )
        .await
        .unwrap();
    assert_eq!(reloaded.row_count, 1);

    let columns = store.table_columns("ing_replace_orders").await.unwrap();
    assert_eq!(columns, vec![("name".to_string(), "text".to_string())]);

    let rows = store
        .execute_sql("SELECT COUNT(*) AS n FROM ing_replace_orders")
        .await
        .unwrap();
    assert_eq!(rows, vec![json!({ "n": 1 })]);

    store.drop_table("ing_replace_orders").await.unwrap();
    println!("✅ Replace mode passed");
}

#[tokio::test]
async fn smoke_test_append_checks_columns() {
    let (store, ingestor) = test_ingestor().await;
    store.drop_table("ing_append_orders").await.unwrap();

    ingestor
        .ingest_file(
            "base.csv",
            b"qty,sku\n1,alpha\n",
            IngestMode::Replace,
            Some("ing_append_orders"),
            "tester",
        )
        .await
        .unwrap();

    let appended = ingestor
        .ingest_file(
            "more.csv",
            b"qty,sku\n2,beta\n3,gamma\n",
            IngestMode::Append,
            Some("ing_append_orders"),
            "tester",
        )
        .await
        .unwrap();
    assert_eq!(appended.row_count, 2);

    let rows = store
        .execute_sql("SELECT COUNT(*) AS n FROM ing_append_orders")
        .await
        .unwrap();
    assert_eq!(rows, vec![json!({ "n": 3 })]);

    // Wrong header set is rejected before any rows load.
    let mismatch = ingestor
        .ingest_file(
            "bad.csv",
            b"qty,color\n4,red\n",
            IngestMode::Append,
            Some("ing_append_orders"),
            "tester",
        )
        .await
        .unwrap_err();
    assert!(matches!(mismatch, IngestError::ColumnMismatch { .. }));

    let missing = ingestor
        .ingest_file(
            "more.csv",
            b"qty,sku\n5,delta\n",
            IngestMode::Append,
            Some("ing_append_nonexistent"),
            "tester",
        )
        .await
        .unwrap_err();
    assert_eq!(
        missing,
        IngestError::TableMissing {
            table: "ing_append_nonexistent".to_string()
        }
    );

    store.drop_table("ing_append_orders").await.unwrap();
    println!("✅ Append mode checks passed");
}

#[tokio::test]
async fn smoke_test_ingest_writes_history() {
    let (store, ingestor) = test_ingestor().await;
    store.drop_table("ing_history_orders").await.unwrap();

    ingestor
        .ingest_file(
            "Ing History Orders.csv",
            b"a\n1\n2\n3\n",
            IngestMode::Create,
            None,
            "auditor",
        )
        .await
        .unwrap();

    let rows = store
        .execute_sql(
            "SELECT mode, file_name, row_count, loaded_by FROM ingest_history
             WHERE table_name = 'ing_history_orders'
             ORDER BY id DESC LIMIT 1",
        )
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![json!({
            "mode": "create",
            "file_name": "Ing History Orders.csv",
            "row_count": 3,
            "loaded_by": "auditor",
        })]
    );

    store.drop_table("ing_history_orders").await.unwrap();
    println!("✅ Ingest history recorded");
}
