//! CSV ingestion for Sift.
//!
//! Takes raw uploaded bytes all the way into Postgres: header
//! sanitizing, type inference over a bounded sample, table-name
//! resolution per ingest mode, and a transactional `COPY` load with an
//! audit record at the end.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use sift_core::{IngestError, IngestMode, NewIngestRecord};
use sift_store::{quote_ident, Store};

// ============================================================================
// IDENTIFIER SANITIZING
// ============================================================================

static NON_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z_]+").expect("Invalid identifier regex"));

/// Fold a raw header or file stem into a safe Postgres identifier.
///
/// Lowercases, collapses every run of other characters to `_`, and
/// prefixes a `_` when the result would start with a digit.
pub fn sanitize_identifier(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut sanitized = NON_IDENT.replace_all(&lowered, "_").into_owned();
    if sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Sanitized column names with collision suffixes (`_2`, `_3`, ...).
///
/// Headers that sanitize to nothing become `col`. First occurrence keeps
/// the bare name; later duplicates get the lowest free suffix.
pub fn normalize_columns(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut base = sanitize_identifier(header);
        if base.is_empty() {
            base = "col".to_string();
        }
        let mut candidate = base.clone();
        let mut suffix = 1u32;
        while out.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        out.push(candidate);
    }
    out
}

/// Table name derived from an uploaded file name, extension stripped.
pub fn table_stem(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    let sanitized = sanitize_identifier(stem);
    if sanitized.is_empty() {
        "table".to_string()
    } else {
        sanitized
    }
}

// ============================================================================
// CSV PARSING
// ============================================================================

/// Parsed CSV payload: raw headers plus rows normalized to header count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse uploaded CSV bytes.
///
/// Forgiving on shape: rows are padded or truncated to the header count,
/// and unreadable rows are skipped with a warning rather than failing
/// the whole upload.
pub fn parse_csv(data: &[u8]) -> Result<ParsedCsv, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| IngestError::MalformedCsv {
            reason: format!("Failed to parse CSV headers: {err}"),
        })?
        .iter()
        .map(|field| field.to_string())
        .collect();

    let header_count = headers.len();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut skipped = 0usize;

    for (index, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(normalize_row(&record, header_count)),
            Err(err) => {
                skipped += 1;
                // +2 for 1-based numbering and the header line
                tracing::warn!(line = index + 2, %err, "Skipping malformed CSV row");
            }
        }
    }

    if skipped > 0 {
        tracing::info!(parsed = rows.len(), skipped, "CSV parsed with skipped rows");
    }

    Ok(ParsedCsv { headers, rows })
}

/// Pad short rows with empty fields and truncate long ones.
fn normalize_row(record: &csv::StringRecord, header_count: usize) -> Vec<String> {
    let mut row: Vec<String> = record.iter().map(|field| field.to_string()).collect();
    while row.len() < header_count {
        row.push(String::new());
    }
    row.truncate(header_count);
    row
}

// ============================================================================
// TYPE INFERENCE
// ============================================================================

/// Number of leading rows sampled when inferring column types.
const INFERENCE_SAMPLE_ROWS: usize = 1000;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Postgres column types the ingestor can infer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    DoublePrecision,
    Timestamp,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Text => "TEXT",
        }
    }
}

fn parses_as_timestamp(value: &str) -> bool {
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    if DATETIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
    {
        return true;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Infer one column's type from its values.
///
/// Precedence is integer, then float, then timestamp, then text. Blank
/// values count as NULL and do not veto a candidate; a column with no
/// values at all stays TEXT.
pub fn infer_sql_type<'a>(values: impl IntoIterator<Item = &'a str>) -> SqlType {
    let mut integer = true;
    let mut float = true;
    let mut timestamp = true;
    let mut saw_value = false;

    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        saw_value = true;
        if integer && value.parse::<i64>().is_err() {
            integer = false;
        }
        if float && value.parse::<f64>().is_err() {
            float = false;
        }
        if timestamp && !parses_as_timestamp(value) {
            timestamp = false;
        }
        if !integer && !float && !timestamp {
            return SqlType::Text;
        }
    }

    if !saw_value {
        SqlType::Text
    } else if integer {
        SqlType::BigInt
    } else if float {
        SqlType::DoublePrecision
    } else if timestamp {
        SqlType::Timestamp
    } else {
        SqlType::Text
    }
}

/// Column types for a parsed file, sampling the first
/// [`INFERENCE_SAMPLE_ROWS`] rows.
pub fn infer_column_types(parsed: &ParsedCsv) -> Vec<SqlType> {
    let sample = &parsed.rows[..parsed.rows.len().min(INFERENCE_SAMPLE_ROWS)];
    (0..parsed.headers.len())
        .map(|column| infer_sql_type(sample.iter().map(|row| row[column].as_str())))
        .collect()
}

// ============================================================================
// TABLE LOADING
// ============================================================================

/// One table loaded from an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub table_name: String,
    pub row_count: i64,
}

/// Loads uploaded CSV files into Postgres data tables.
#[derive(Clone)]
pub struct Ingestor {
    store: Store,
}

impl Ingestor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Load one uploaded CSV file according to `mode`.
    ///
    /// Create derives the table name from the file name, suffixing `_1`,
    /// `_2`, ... on collision; replace and append require `target_table`.
    /// DDL and COPY share one transaction, so a failed load leaves no
    /// half-created table behind.
    pub async fn ingest_file(
        &self,
        file_name: &str,
        data: &[u8],
        mode: IngestMode,
        target_table: Option<&str>,
        loaded_by: &str,
    ) -> Result<LoadedTable, IngestError> {
        if data.is_empty() {
            return Err(IngestError::EmptyFile);
        }

        let parsed = parse_csv(data)?;
        let columns = normalize_columns(&parsed.headers);
        if columns.is_empty() {
            return Err(IngestError::NoColumns {
                file_name: file_name.to_string(),
            });
        }

        let (table_name, setup_sql) = match mode {
            IngestMode::Create => {
                let table = self.next_free_table_name(&table_stem(file_name)).await?;
                let create = create_table_sql(&table, &columns, &infer_column_types(&parsed));
                (table, vec![create])
            }
            IngestMode::Replace => {
                let table = required_target(mode, target_table)?;
                let drop = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&table));
                let create = create_table_sql(&table, &columns, &infer_column_types(&parsed));
                (table, vec![drop, create])
            }
            IngestMode::Append => {
                let table = required_target(mode, target_table)?;
                if !self.store.table_exists(&table).await? {
                    return Err(IngestError::TableMissing { table });
                }
                let existing: Vec<String> = self
                    .store
                    .table_columns(&table)
                    .await?
                    .into_iter()
                    .map(|(name, _)| name)
                    .collect();
                if existing != columns {
                    return Err(IngestError::ColumnMismatch {
                        table,
                        expected: existing,
                        got: columns,
                    });
                }
                (table, Vec::new())
            }
        };

        let payload = rows_to_csv(&parsed.rows)?;
        let row_count = self
            .store
            .load_csv_in_txn(&table_name, &columns, &payload, &setup_sql)
            .await? as i64;

        self.store.analyze_table(&table_name).await?;
        self.store
            .record_ingest(&NewIngestRecord {
                table_name: table_name.clone(),
                mode,
                file_name: file_name.to_string(),
                row_count,
                loaded_by: loaded_by.to_string(),
            })
            .await?;

        tracing::info!(table = %table_name, rows = row_count, %mode, "File ingested");
        Ok(LoadedTable {
            table_name,
            row_count,
        })
    }

    /// First free name in the sequence `base`, `base_1`, `base_2`, ...
    async fn next_free_table_name(&self, base: &str) -> Result<String, IngestError> {
        if !self.store.table_exists(base).await? {
            return Ok(base.to_string());
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !self.store.table_exists(&candidate).await? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn required_target(mode: IngestMode, target_table: Option<&str>) -> Result<String, IngestError> {
    let sanitized = target_table.map(sanitize_identifier).unwrap_or_default();
    if sanitized.is_empty() {
        return Err(IngestError::TableRequired { mode });
    }
    Ok(sanitized)
}

fn create_table_sql(table: &str, columns: &[String], types: &[SqlType]) -> String {
    let column_defs = columns
        .iter()
        .zip(types)
        .map(|(name, sql_type)| format!("{} {}", quote_ident(name), sql_type.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table), column_defs)
}

/// Re-serialize normalized rows as headerless CSV for COPY.
///
/// Blank fields stay unquoted so COPY reads them as NULL.
fn rows_to_csv(rows: &[Vec<String>]) -> Result<Vec<u8>, IngestError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| IngestError::MalformedCsv {
                reason: format!("Failed to serialize row for COPY: {err}"),
            })?;
    }
    writer.into_inner().map_err(|err| IngestError::MalformedCsv {
        reason: format!("Failed to flush COPY buffer: {err}"),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sift_store::StoreConfig;

    // --- sanitizing ---

    #[test]
    fn test_sanitize_lowercases_and_collapses() {
        assert_eq!(sanitize_identifier("Order Total (EUR)"), "order_total_eur_");
        assert_eq!(sanitize_identifier("  qty  "), "qty");
        assert_eq!(sanitize_identifier("a-b.c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_prefixes_leading_digit() {
        assert_eq!(sanitize_identifier("2024 sales"), "_2024_sales");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_identifier("Unit Price ($)");
        assert_eq!(sanitize_identifier(&once), once);
    }

    #[test]
    fn test_normalize_columns_suffixes_duplicates() {
        let headers = vec!["a".to_string(), "A".to_string(), "a".to_string()];
        assert_eq!(normalize_columns(&headers), vec!["a", "a_2", "a_3"]);
    }

    #[test]
    fn test_normalize_columns_avoids_existing_suffix() {
        let headers = vec!["a".to_string(), "a_2".to_string(), "a".to_string()];
        assert_eq!(normalize_columns(&headers), vec!["a", "a_2", "a_3"]);
    }

    #[test]
    fn test_normalize_columns_names_blank_headers() {
        let headers = vec!["".to_string(), " ".to_string()];
        assert_eq!(normalize_columns(&headers), vec!["col", "col_2"]);
    }

    #[test]
    fn test_table_stem_strips_extension() {
        assert_eq!(table_stem("Sales Report.csv"), "sales_report");
        assert_eq!(table_stem("orders.CSV"), "orders");
        assert_eq!(table_stem("plain"), "plain");
    }

    // --- parsing ---

    #[test]
    fn test_parse_csv_basic() {
        let parsed = parse_csv(b"qty,sku\n1,alpha\n2,beta\n").unwrap();
        assert_eq!(parsed.headers, vec!["qty", "sku"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0], vec!["1", "alpha"]);
    }

    #[test]
    fn test_parse_csv_normalizes_ragged_rows() {
        let parsed = parse_csv(b"a,b,c\n1,2\n1,2,3,4\n").unwrap();
        assert_eq!(parsed.rows[0], vec!["1", "2", ""]);
        assert_eq!(parsed.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parse_csv_trims_fields() {
        let parsed = parse_csv(b"a , b\n 1 , x \n").unwrap();
        assert_eq!(parsed.headers, vec!["a", "b"]);
        assert_eq!(parsed.rows[0], vec!["1", "x"]);
    }

    // --- inference ---

    #[test]
    fn test_infer_integers() {
        assert_eq!(infer_sql_type(["1", "-2", "300"]), SqlType::BigInt);
    }

    #[test]
    fn test_infer_blanks_do_not_veto() {
        assert_eq!(infer_sql_type(["1", "", "  ", "2"]), SqlType::BigInt);
    }

    #[test]
    fn test_infer_floats_beat_timestamps() {
        assert_eq!(infer_sql_type(["1.5", "2"]), SqlType::DoublePrecision);
        assert_eq!(infer_sql_type(["1e3", "2.0"]), SqlType::DoublePrecision);
    }

    #[test]
    fn test_infer_timestamps() {
        assert_eq!(
            infer_sql_type(["2024-01-02", "2024-02-03"]),
            SqlType::Timestamp
        );
        assert_eq!(
            infer_sql_type(["2024-01-02 03:04:05", "2024-01-02T03:04:05"]),
            SqlType::Timestamp
        );
        assert_eq!(
            infer_sql_type(["2024-01-02T03:04:05Z"]),
            SqlType::Timestamp
        );
    }

    #[test]
    fn test_infer_mixed_falls_back_to_text() {
        assert_eq!(infer_sql_type(["1", "alpha"]), SqlType::Text);
        assert_eq!(infer_sql_type(["2024-01-02", "soon"]), SqlType::Text);
    }

    #[test]
    fn test_infer_empty_column_is_text() {
        assert_eq!(infer_sql_type(["", "  "]), SqlType::Text);
        assert_eq!(infer_sql_type([]), SqlType::Text);
    }

    #[test]
    fn test_infer_column_types_per_column() {
        let parsed = parse_csv(b"qty,price,day,note\n1,9.99,2024-01-02,hi\n2,1.5,2024-01-03,\n").unwrap();
        assert_eq!(
            infer_column_types(&parsed),
            vec![
                SqlType::BigInt,
                SqlType::DoublePrecision,
                SqlType::Timestamp,
                SqlType::Text
            ]
        );
    }

    // --- DDL and COPY payload ---

    #[test]
    fn test_create_table_sql_quotes_identifiers() {
        let sql = create_table_sql(
            "orders",
            &["qty".to_string(), "sku".to_string()],
            &[SqlType::BigInt, SqlType::Text],
        );
        assert_eq!(sql, "CREATE TABLE \"orders\" (\"qty\" BIGINT, \"sku\" TEXT)");
    }

    #[test]
    fn test_rows_to_csv_is_headerless_and_quotes_when_needed() {
        let rows = vec![
            vec!["1".to_string(), "plain".to_string()],
            vec!["2".to_string(), "with,comma".to_string()],
            vec!["3".to_string(), String::new()],
        ];
        let payload = rows_to_csv(&rows).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "1,plain\n2,\"with,comma\"\n3,\n"
        );
    }

    // --- mode checks that fail before touching the database ---

    fn offline_ingestor() -> Ingestor {
        // The pool is lazy, so a default config works without a server.
        Ingestor::new(Store::from_config(&StoreConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let ingestor = offline_ingestor();
        let err = ingestor
            .ingest_file("orders.csv", b"", IngestMode::Create, None, "tester")
            .await
            .unwrap_err();
        assert_eq!(err, IngestError::EmptyFile);
    }

    #[tokio::test]
    async fn test_replace_requires_target_table() {
        let ingestor = offline_ingestor();
        let err = ingestor
            .ingest_file(
                "orders.csv",
                b"a\n1\n",
                IngestMode::Replace,
                None,
                "tester",
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::TableRequired {
                mode: IngestMode::Replace
            }
        );
    }

    #[tokio::test]
    async fn test_append_rejects_blank_target() {
        let ingestor = offline_ingestor();
        let err = ingestor
            .ingest_file(
                "orders.csv",
                b"a\n1\n",
                IngestMode::Append,
                Some("   "),
                "tester",
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::TableRequired {
                mode: IngestMode::Append
            }
        );
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Sanitized identifiers only contain `[0-9a-z_]` and never start
        /// with a digit.
        #[test]
        fn prop_sanitize_output_is_safe(raw in ".{0,40}") {
            let sanitized = sanitize_identifier(&raw);
            prop_assert!(sanitized
                .chars()
                .all(|c| c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit()));
            if let Some(first) = sanitized.chars().next() {
                prop_assert!(!first.is_ascii_digit());
            }
        }

        /// Sanitizing is idempotent.
        #[test]
        fn prop_sanitize_is_idempotent(raw in ".{0,40}") {
            let once = sanitize_identifier(&raw);
            prop_assert_eq!(sanitize_identifier(&once), once);
        }

        /// Normalized column lists keep their length and are collision free.
        #[test]
        fn prop_normalized_columns_are_unique(
            headers in prop::collection::vec(".{0,12}", 0..12)
        ) {
            let columns = normalize_columns(&headers);
            prop_assert_eq!(columns.len(), headers.len());
            let unique: std::collections::HashSet<_> = columns.iter().collect();
            prop_assert_eq!(unique.len(), columns.len());
        }

        /// Columns of integer literals always infer as BIGINT.
        #[test]
        fn prop_integer_columns_infer_bigint(
            values in prop::collection::vec(any::<i64>(), 1..50)
        ) {
            let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            let inferred = infer_sql_type(rendered.iter().map(|s| s.as_str()));
            prop_assert_eq!(inferred, SqlType::BigInt);
        }

        /// Normalized rows always match the header count.
        #[test]
        fn prop_parsed_rows_match_header_count(
            rows in prop::collection::vec(
                prop::collection::vec("[a-z0-9 ]{0,8}", 0..6),
                0..20
            )
        ) {
            let mut data = String::from("c1,c2,c3\n");
            for row in &rows {
                data.push_str(&row.join(","));
                data.push('\n');
            }
            let parsed = parse_csv(data.as_bytes()).unwrap();
            for row in &parsed.rows {
                prop_assert_eq!(row.len(), 3);
            }
        }
    }
}
