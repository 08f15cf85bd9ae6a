//! Analyst stage.
//!
//! Rebuilds the heuristic metric set for a table from its described
//! columns. Numeric columns get SUM and AVG aggregates, datetime columns
//! a per-day count series, and everything else a top-20 category count.
//! Only columns the dictionary stage has described take part.

use async_trait::async_trait;

use sift_core::{ColumnMeta, NewMetric, StageError, StageKind, VizHint};
use sift_pipeline::TableStage;
use sift_store::Store;

/// Third pipeline stage: derive metrics per described column.
#[derive(Clone)]
pub struct AnalystAgent {
    store: Store,
}

impl AnalystAgent {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

/// Heuristic metrics for one column. Metric names are prefixed
/// `{table}.` so the store can replace a table's set wholesale.
pub fn column_metrics(table: &str, column: &ColumnMeta) -> Vec<NewMetric> {
    let col = &column.column_name;

    if column.is_numeric {
        vec![
            NewMetric {
                metric_name: format!("{table}.{col}_sum"),
                sql_definition: format!(
                    "SELECT SUM(\"{col}\") AS \"sum_{col}\" FROM \"{table}\""
                ),
                viz_hint: VizHint::numeric(format!("sum_{col}")),
                importance_score: 0.0,
                tags: vec![table.to_string(), col.clone(), "sum".to_string()],
            },
            NewMetric {
                metric_name: format!("{table}.{col}_avg"),
                sql_definition: format!(
                    "SELECT AVG(\"{col}\") AS \"avg_{col}\" FROM \"{table}\""
                ),
                viz_hint: VizHint::numeric(format!("avg_{col}")),
                importance_score: 0.0,
                tags: vec![table.to_string(), col.clone(), "avg".to_string()],
            },
        ]
    } else if column.is_datetime {
        vec![NewMetric {
            metric_name: format!("{table}.{col}_count_per_day"),
            sql_definition: format!(
                "SELECT DATE(\"{col}\") AS day, COUNT(*) AS count \
                 FROM \"{table}\" GROUP BY DATE(\"{col}\") ORDER BY day"
            ),
            viz_hint: VizHint::line("day", "count"),
            importance_score: 0.0,
            tags: vec![table.to_string(), col.clone(), "time-series".to_string()],
        }]
    } else {
        vec![NewMetric {
            metric_name: format!("{table}.{col}_distinct_count"),
            sql_definition: format!(
                "SELECT \"{col}\" AS category, COUNT(*) AS count \
                 FROM \"{table}\" GROUP BY \"{col}\" ORDER BY count DESC LIMIT 20"
            ),
            viz_hint: VizHint::bar("category", "count"),
            importance_score: 0.0,
            tags: vec![table.to_string(), col.clone(), "categorical".to_string()],
        }]
    }
}

#[async_trait]
impl TableStage for AnalystAgent {
    fn kind(&self) -> StageKind {
        StageKind::Analyst
    }

    async fn execute(&self, table: &str) -> Result<(), StageError> {
        let described = self.store.described_columns_for_table(table).await?;

        let metrics: Vec<NewMetric> = described
            .iter()
            .flat_map(|column| column_metrics(table, column))
            .collect();

        self.store.replace_table_metrics(table, &metrics).await?;
        tracing::debug!(table, count = metrics.len(), "Table metrics rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::ChartKind;

    fn column(name: &str, data_type: &str, is_numeric: bool, is_datetime: bool) -> ColumnMeta {
        ColumnMeta {
            id: 1,
            table_name: "orders".to_string(),
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            is_numeric,
            is_datetime,
        }
    }

    #[test]
    fn test_numeric_column_gets_sum_and_avg() {
        let metrics = column_metrics("orders", &column("amount", "double precision", true, false));
        assert_eq!(metrics.len(), 2);

        assert_eq!(metrics[0].metric_name, "orders.amount_sum");
        assert_eq!(
            metrics[0].sql_definition,
            "SELECT SUM(\"amount\") AS \"sum_amount\" FROM \"orders\""
        );
        assert_eq!(metrics[0].viz_hint, VizHint::numeric("sum_amount"));
        assert_eq!(metrics[0].tags, vec!["orders", "amount", "sum"]);

        assert_eq!(metrics[1].metric_name, "orders.amount_avg");
        assert_eq!(
            metrics[1].sql_definition,
            "SELECT AVG(\"amount\") AS \"avg_amount\" FROM \"orders\""
        );
        assert_eq!(metrics[1].viz_hint.y.as_deref(), Some("avg_amount"));
    }

    #[test]
    fn test_datetime_column_gets_daily_series() {
        let metrics = column_metrics("orders", &column("placed_at", "timestamp", false, true));
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_name, "orders.placed_at_count_per_day");
        assert_eq!(
            metrics[0].sql_definition,
            "SELECT DATE(\"placed_at\") AS day, COUNT(*) AS count \
             FROM \"orders\" GROUP BY DATE(\"placed_at\") ORDER BY day"
        );
        assert_eq!(metrics[0].viz_hint, VizHint::line("day", "count"));
        assert_eq!(metrics[0].tags, vec!["orders", "placed_at", "time-series"]);
    }

    #[test]
    fn test_other_columns_get_category_counts() {
        let metrics = column_metrics("orders", &column("status", "text", false, false));
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_name, "orders.status_distinct_count");
        assert_eq!(
            metrics[0].sql_definition,
            "SELECT \"status\" AS category, COUNT(*) AS count \
             FROM \"orders\" GROUP BY \"status\" ORDER BY count DESC LIMIT 20"
        );
        assert_eq!(metrics[0].viz_hint.kind, ChartKind::Bar);
        assert_eq!(metrics[0].tags, vec!["orders", "status", "categorical"]);
    }

    #[test]
    fn test_all_metrics_carry_table_prefix_and_zero_score() {
        for column in [
            column("a", "bigint", true, false),
            column("b", "date", false, true),
            column("c", "text", false, false),
        ] {
            for metric in column_metrics("orders", &column) {
                assert!(metric.metric_name.starts_with("orders."));
                assert_eq!(metric.importance_score, 0.0);
                assert_eq!(metric.tags[0], "orders");
            }
        }
    }
}
