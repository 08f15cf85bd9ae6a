//! PostgreSQL catalog store for Sift.
//!
//! Owns the pooled connection setup and every query the rest of the
//! system runs against Postgres: the catalog tables (`columns`,
//! `column_dictionary`, `metrics`, `ingest_history`), bulk CSV loading
//! via `COPY FROM STDIN`, and read-only execution of generated SQL.
//!
//! All handles are cheap to clone; the pool itself is established
//! lazily on first use.

use bytes::Bytes;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use futures_util::{pin_mut, SinkExt};
use serde_json::Value as JsonValue;
use tokio_postgres::NoTls;

use sift_core::{
    CatalogColumn, ColumnMeta, Metric, NewColumnMeta, NewIngestRecord, NewMetric, StoreError,
    VizHint,
};

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Full connection URL. Takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "sift".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// `SIFT_DATABASE_URL` (or the conventional `DATABASE_URL`) wins when
    /// present; otherwise the `SIFT_DB_*` variables fill in the pieces.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("SIFT_DATABASE_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok(),
            host: std::env::var("SIFT_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("SIFT_DB_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("SIFT_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("SIFT_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("SIFT_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: std::env::var("SIFT_DB_POOL_SIZE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.max_size),
        }
    }

    /// Create a deadpool connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, StoreError> {
        let mut cfg = Config::new();
        if let Some(url) = &self.url {
            cfg.url = Some(url.clone());
        } else {
            cfg.host = Some(self.host.clone());
            cfg.port = Some(self.port);
            cfg.dbname = Some(self.dbname.clone());
            cfg.user = Some(self.user.clone());
            cfg.password = Some(self.password.clone());
        }
        cfg.pool = Some(PoolConfig::new(self.max_size));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|err| StoreError::PoolUnavailable {
                reason: format!("Failed to create connection pool: {err}"),
            })
    }
}

// ============================================================================
// Store Client
// ============================================================================

/// Cloneable handle over the connection pool.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.create_pool()?))
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|err| StoreError::PoolUnavailable {
                reason: err.to_string(),
            })
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(query_failed)?;
        Ok(())
    }
}

fn query_failed(err: tokio_postgres::Error) -> StoreError {
    StoreError::QueryFailed {
        reason: err.to_string(),
    }
}

// ============================================================================
// Schema Bootstrap
// ============================================================================

/// Catalog tables created at startup. `IF NOT EXISTS` keeps restarts cheap.
const CATALOG_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS columns (
    id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    data_type TEXT NOT NULL,
    is_numeric BOOLEAN NOT NULL DEFAULT FALSE,
    is_datetime BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (table_name, column_name)
);

CREATE TABLE IF NOT EXISTS column_dictionary (
    column_id BIGINT PRIMARY KEY REFERENCES columns (id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS metrics (
    id BIGSERIAL PRIMARY KEY,
    metric_name TEXT NOT NULL UNIQUE,
    sql_definition TEXT NOT NULL,
    viz_hint JSONB NOT NULL,
    importance_score DOUBLE PRECISION NOT NULL DEFAULT 0,
    tags JSONB NOT NULL DEFAULT '[]'::jsonb
);

CREATE TABLE IF NOT EXISTS ingest_history (
    id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    mode TEXT NOT NULL,
    file_name TEXT NOT NULL,
    row_count BIGINT NOT NULL,
    loaded_by TEXT NOT NULL,
    loaded_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

impl Store {
    /// Create the catalog tables if they are missing.
    ///
    /// Runs once at startup; a failure here is fatal for the service.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.batch_execute(CATALOG_DDL)
            .await
            .map_err(|err| StoreError::BootstrapFailed {
                reason: err.to_string(),
            })?;
        tracing::debug!("Catalog schema ensured");
        Ok(())
    }
}

// ============================================================================
// Column Operations
// ============================================================================

impl Store {
    /// Replace the catalog rows for one table in a single transaction.
    ///
    /// Running the extractor twice for the same table therefore converges
    /// to the same catalog state.
    pub async fn replace_column_meta(
        &self,
        table: &str,
        columns: &[NewColumnMeta],
    ) -> Result<(), StoreError> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_failed)?;

        tx.execute("DELETE FROM columns WHERE table_name = $1", &[&table])
            .await
            .map_err(query_failed)?;

        for column in columns {
            tx.execute(
                "INSERT INTO columns (table_name, column_name, data_type, is_numeric, is_datetime)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &column.table_name,
                    &column.column_name,
                    &column.data_type,
                    &column.is_numeric,
                    &column.is_datetime,
                ],
            )
            .await
            .map_err(query_failed)?;
        }

        tx.commit().await.map_err(query_failed)?;
        tracing::debug!(table, count = columns.len(), "Replaced column metadata");
        Ok(())
    }

    /// All catalog columns recorded for a table, in insertion order.
    pub async fn columns_for_table(&self, table: &str) -> Result<Vec<ColumnMeta>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, table_name, column_name, data_type, is_numeric, is_datetime
                 FROM columns WHERE table_name = $1 ORDER BY id",
                &[&table],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    /// Columns of a table that already carry a dictionary description.
    pub async fn described_columns_for_table(
        &self,
        table: &str,
    ) -> Result<Vec<ColumnMeta>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT c.id, c.table_name, c.column_name, c.data_type, c.is_numeric, c.is_datetime
                 FROM columns c
                 JOIN column_dictionary d ON d.column_id = c.id
                 WHERE c.table_name = $1
                 ORDER BY c.id",
                &[&table],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    /// The full catalog with descriptions where available. Feeds the
    /// schema section of text-to-SQL prompts.
    pub async fn full_catalog(&self) -> Result<Vec<CatalogColumn>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT c.id, c.table_name, c.column_name, c.data_type, c.is_numeric,
                        c.is_datetime, d.description
                 FROM columns c
                 LEFT JOIN column_dictionary d ON d.column_id = c.id
                 ORDER BY c.table_name, c.id",
                &[],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| CatalogColumn {
                column: column_from_row(row),
                description: row.get("description"),
            })
            .collect())
    }
}

fn column_from_row(row: &tokio_postgres::Row) -> ColumnMeta {
    ColumnMeta {
        id: row.get("id"),
        table_name: row.get("table_name"),
        column_name: row.get("column_name"),
        data_type: row.get("data_type"),
        is_numeric: row.get("is_numeric"),
        is_datetime: row.get("is_datetime"),
    }
}

// ============================================================================
// Dictionary Operations
// ============================================================================

impl Store {
    /// Insert or refresh the description for one catalog column.
    pub async fn upsert_column_description(
        &self,
        column_id: i64,
        description: &str,
    ) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO column_dictionary (column_id, description)
             VALUES ($1, $2)
             ON CONFLICT (column_id)
             DO UPDATE SET description = EXCLUDED.description, updated_at = now()",
            &[&column_id, &description],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }
}

// ============================================================================
// Metric Operations
// ============================================================================

impl Store {
    /// Replace every metric belonging to a table in a single transaction.
    ///
    /// Metric names are prefixed `{table}.`, so deletion goes by prefix.
    /// `%` and `_` are escaped to keep `orders_2` from matching `ordersX2`.
    pub async fn replace_table_metrics(
        &self,
        table: &str,
        metrics: &[NewMetric],
    ) -> Result<(), StoreError> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_failed)?;

        let pattern = format!("{}.%", like_escape(table));
        tx.execute("DELETE FROM metrics WHERE metric_name LIKE $1", &[&pattern])
            .await
            .map_err(query_failed)?;

        for metric in metrics {
            let viz = serde_json::to_value(&metric.viz_hint).map_err(|err| {
                StoreError::QueryFailed {
                    reason: format!("viz hint for {} is not serializable: {err}", metric.metric_name),
                }
            })?;
            let tags = JsonValue::from(metric.tags.clone());
            tx.execute(
                "INSERT INTO metrics (metric_name, sql_definition, viz_hint, importance_score, tags)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &metric.metric_name,
                    &metric.sql_definition,
                    &viz,
                    &metric.importance_score,
                    &tags,
                ],
            )
            .await
            .map_err(query_failed)?;
        }

        tx.commit().await.map_err(query_failed)?;
        tracing::debug!(table, count = metrics.len(), "Replaced table metrics");
        Ok(())
    }

    /// Every stored metric, oldest first.
    pub async fn list_metrics(&self) -> Result<Vec<Metric>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, metric_name, sql_definition, viz_hint, importance_score, tags
                 FROM metrics ORDER BY id",
                &[],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(metric_from_row).collect()
    }

    /// Look up one metric by id.
    pub async fn get_metric(&self, id: i64) -> Result<Metric, StoreError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, metric_name, sql_definition, viz_hint, importance_score, tags
                 FROM metrics WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(query_failed)?;
        match row {
            Some(row) => metric_from_row(&row),
            None => Err(StoreError::MetricNotFound { id }),
        }
    }
}

fn metric_from_row(row: &tokio_postgres::Row) -> Result<Metric, StoreError> {
    let id: i64 = row.get("id");
    let viz_hint: JsonValue = row.get("viz_hint");
    let viz_hint: VizHint =
        serde_json::from_value(viz_hint).map_err(|err| StoreError::QueryFailed {
            reason: format!("Metric {id} carries an unreadable viz hint: {err}"),
        })?;
    let tags: JsonValue = row.get("tags");
    let tags: Vec<String> =
        serde_json::from_value(tags).map_err(|err| StoreError::QueryFailed {
            reason: format!("Metric {id} carries unreadable tags: {err}"),
        })?;
    Ok(Metric {
        id,
        metric_name: row.get("metric_name"),
        sql_definition: row.get("sql_definition"),
        viz_hint,
        importance_score: row.get("importance_score"),
        tags,
    })
}

// ============================================================================
// Ingest Support
// ============================================================================

impl Store {
    /// Whether a relation with this name is visible on the search path.
    pub async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&table])
            .await
            .map_err(query_failed)?;
        Ok(row.get(0))
    }

    /// Physical column names and types of a data table, in definition order.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT column_name::text, data_type::text
                 FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| (row.get("column_name"), row.get("data_type")))
            .collect())
    }

    /// Run DDL produced by the ingestor (`CREATE TABLE`, index statements).
    pub async fn execute_ddl(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.batch_execute(sql).await.map_err(query_failed)?;
        Ok(())
    }

    /// Drop a data table if it exists.
    pub async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table));
        conn.batch_execute(&sql).await.map_err(query_failed)?;
        Ok(())
    }

    /// Bulk-load headerless CSV data into `table` via `COPY FROM STDIN`,
    /// running any setup DDL in the same transaction.
    ///
    /// Ingest uses `setup_sql` for `CREATE TABLE` (create mode) and
    /// `DROP` + `CREATE` (replace mode), so a COPY failure rolls the
    /// whole load back. The column list is explicit: CSV rows must match
    /// `columns` in order and count. Returns the number of rows written.
    pub async fn load_csv_in_txn(
        &self,
        table: &str,
        columns: &[String],
        data: &[u8],
        setup_sql: &[String],
    ) -> Result<u64, StoreError> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_failed)?;

        for sql in setup_sql {
            tx.batch_execute(sql).await.map_err(query_failed)?;
        }

        let column_list = columns
            .iter()
            .map(|name| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
            quote_ident(table),
            column_list
        );

        let copy_failed = |err: tokio_postgres::Error| StoreError::CopyFailed {
            table: table.to_string(),
            reason: err.to_string(),
        };

        let rows = {
            let sink = tx.copy_in(&sql).await.map_err(copy_failed)?;
            pin_mut!(sink);
            sink.send(Bytes::copy_from_slice(data))
                .await
                .map_err(copy_failed)?;
            sink.finish().await.map_err(copy_failed)?
        };

        tx.commit().await.map_err(query_failed)?;
        tracing::debug!(table, rows, "COPY completed");
        Ok(rows)
    }

    /// Refresh planner statistics after a bulk load.
    pub async fn analyze_table(&self, table: &str) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!("ANALYZE {}", quote_ident(table));
        conn.batch_execute(&sql).await.map_err(query_failed)?;
        Ok(())
    }

    /// Append one row to the ingest audit log.
    pub async fn record_ingest(&self, record: &NewIngestRecord) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let mode = record.mode.as_str();
        conn.execute(
            "INSERT INTO ingest_history (table_name, mode, file_name, row_count, loaded_by)
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &record.table_name,
                &mode,
                &record.file_name,
                &record.row_count,
                &record.loaded_by,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }
}

// ============================================================================
// Query Execution
// ============================================================================

impl Store {
    /// Execute a read-only SELECT and return its rows as JSON objects.
    ///
    /// The statement is wrapped in a `json_agg(row_to_json(..))` subquery so
    /// Postgres itself renders every value as JSON. That sidesteps having to
    /// map arbitrary column types (NUMERIC from `SUM`/`AVG` in particular)
    /// on the client side.
    pub async fn execute_sql(&self, sql: &str) -> Result<Vec<JsonValue>, StoreError> {
        let conn = self.get_conn().await?;
        let wrapped = wrap_for_json(sql);
        let row = conn
            .query_one(&wrapped, &[])
            .await
            .map_err(query_failed)?;
        let aggregated: JsonValue = row.get(0);
        match aggregated {
            JsonValue::Array(rows) => Ok(rows),
            other => Err(StoreError::QueryFailed {
                reason: format!("Expected a JSON array of rows, got {other}"),
            }),
        }
    }
}

/// Wrap a SELECT so the server returns one JSON array of row objects.
fn wrap_for_json(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';').trim();
    format!("SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM ({inner}) t")
}

// ============================================================================
// Identifier Quoting
// ============================================================================

/// Quote an identifier for interpolation into DDL and COPY statements.
///
/// Parameter binding does not cover identifiers, so they are double-quoted
/// with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape LIKE wildcards so a pattern built from a name matches literally.
fn like_escape(name: &str) -> String {
    name.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.url.is_none());
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "sift");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_create_pool_is_lazy() {
        // No server is running here; pool creation must still succeed
        // because connections are only opened on first checkout.
        let config = StoreConfig::default();
        assert!(config.create_pool().is_ok());
    }

    #[test]
    fn test_quote_ident_wraps_in_double_quotes() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("order_total"), "\"order_total\"");
    }

    #[test]
    fn test_quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("od\"d"), "\"od\"\"d\"");
    }

    #[test]
    fn test_like_escape_neutralizes_wildcards() {
        assert_eq!(like_escape("orders_2"), "orders\\_2");
        assert_eq!(like_escape("100%"), "100\\%");
        assert_eq!(like_escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_wrap_for_json_strips_trailing_semicolon() {
        let wrapped = wrap_for_json("SELECT 1 AS one;");
        assert_eq!(
            wrapped,
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM (SELECT 1 AS one) t"
        );
    }

    #[test]
    fn test_wrap_for_json_keeps_inner_statement() {
        let wrapped = wrap_for_json("  SELECT a, b FROM x ORDER BY a  ");
        assert!(wrapped.contains("(SELECT a, b FROM x ORDER BY a) t"));
    }

    #[test]
    fn test_catalog_ddl_covers_all_tables() {
        for table in [
            "columns",
            "column_dictionary",
            "metrics",
            "ingest_history",
        ] {
            assert!(
                CATALOG_DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "DDL is missing {table}"
            );
        }
    }
}
