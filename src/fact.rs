//! Fact writer & reader: thin wrappers around batch append and a
//! parameterised `SELECT` with a small options object.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::schema::FactSchema;
use crate::store::{fact_table, ColumnStore};
use crate::value::Value;

pub struct FactWriter {
    store: Arc<dyn ColumnStore>,
    schema: Arc<dyn FactSchema>,
}

impl FactWriter {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn FactSchema>) -> Self {
        Self { store, schema }
    }

    /// Append a batch of rows; every row must have exactly the configured
    /// column count. Committed atomically on send; the batch handle is
    /// released on every exit path because `Box<dyn Batch>` is consumed
    /// by `send` or simply dropped on an early return.
    pub async fn append(&self, rows: &[Vec<Value>], cancel: &CancellationToken) -> Result<u64, EngineError> {
        let expected = self.schema.columns().len();
        for row in rows {
            if row.len() != expected {
                return Err(EngineError::caller_contract(
                    self.schema.name(),
                    None,
                    format!("row has {} values, schema `{}` expects {expected}", row.len(), self.schema.name()),
                ));
            }
        }
        let column_names: Vec<String> = self.schema.columns().iter().map(|c| c.name.clone()).collect();
        let mut batch = self.store.prepare_batch(&fact_table(self.schema.name()), &column_names).await?;
        let count = rows.len() as u64;
        for row in rows {
            batch.append(row.clone(), cancel).await?;
        }
        batch.send(cancel).await?;
        Ok(count)
    }
}

/// Read options for `FactReader::get_rows`.
#[derive(Debug, Clone, Default)]
pub struct GetRowsOptions {
    /// Inclusive lower bound on the time column; ignored if the schema
    /// declares no time column.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the time column; ignored if the schema
    /// declares no time column.
    pub end_time: Option<DateTime<Utc>>,
    /// Extra predicate appended after the time bounds, with its own
    /// positional `?` arguments.
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
    /// Defaults to the time column descending when one is configured,
    /// otherwise no ordering at all.
    pub order_by: Option<String>,
    /// `0` means no limit.
    pub limit: u64,
}

impl GetRowsOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct FactReader {
    store: Arc<dyn ColumnStore>,
    schema: Arc<dyn FactSchema>,
}

impl FactReader {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn FactSchema>) -> Self {
        Self { store, schema }
    }

    fn build_sql(&self, options: &GetRowsOptions) -> (String, Vec<Value>) {
        let table = fact_table(self.schema.name());
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(time_col) = self.schema.time_column() {
            if let Some(start) = options.start_time {
                clauses.push(format!("{time_col} >= ?"));
                args.push(Value::Timestamp(start));
            }
            if let Some(end) = options.end_time {
                clauses.push(format!("{time_col} <= ?"));
                args.push(Value::Timestamp(end));
            }
        }

        if let Some(extra) = &options.where_clause {
            clauses.push(format!("({extra})"));
            args.extend(options.where_args.clone());
        }

        let mut sql = format!("SELECT * FROM {table}");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let order_by = options
            .order_by
            .clone()
            .or_else(|| self.schema.time_column().map(|c| format!("{c} DESC")));
        if let Some(order_by) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by);
        }

        if options.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", options.limit));
        }

        (sql, args)
    }

    pub async fn get_rows(
        &self,
        options: &GetRowsOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::value::RowMap>, EngineError> {
        let (sql, args) = self.build_sql(options);
        let result = self.store.query(&sql, &args, cancel).await?;
        Ok(result.rows)
    }

    /// Escape hatch: raw SQL, raw positional args.
    pub async fn query(&self, sql: &str, args: &[Value], cancel: &CancellationToken) -> Result<crate::store::QueryResult, EngineError> {
        self.store.query(sql, args, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SimpleFactSchema;

    fn schema() -> Arc<dyn FactSchema> {
        Arc::new(
            SimpleFactSchema::new("gossip_events", &["node_id:text", "event_ts:timestamptz", "kind:text"])
                .unwrap()
                .with_time_column("event_ts")
                .unwrap(),
        )
    }

    fn reader() -> FactReader {
        struct NoopStore;
        #[async_trait::async_trait]
        impl ColumnStore for NoopStore {
            async fn query(&self, _: &str, _: &[Value], _: &tokio_util::sync::CancellationToken) -> Result<crate::store::QueryResult, EngineError> {
                Ok(Default::default())
            }
            async fn execute(&self, _: &str, _: &[Value], _: &tokio_util::sync::CancellationToken) -> Result<u64, EngineError> {
                Ok(0)
            }
            async fn prepare_batch(&self, _: &str, _: &[String]) -> Result<Box<dyn crate::store::Batch>, EngineError> {
                unimplemented!()
            }
        }
        FactReader::new(Arc::new(NoopStore), schema())
    }

    #[test]
    fn default_order_is_time_column_descending() {
        let r = reader();
        let (sql, _) = r.build_sql(&GetRowsOptions::new());
        assert!(sql.contains("ORDER BY event_ts DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn explicit_order_by_overrides_default() {
        let r = reader();
        let options = GetRowsOptions { order_by: Some("kind ASC".to_string()), ..Default::default() };
        let (sql, _) = r.build_sql(&options);
        assert!(sql.contains("ORDER BY kind ASC"));
    }

    #[test]
    fn time_bounds_become_positional_args_in_order() {
        let r = reader();
        let start = Utc::now();
        let end = Utc::now();
        let options = GetRowsOptions { start_time: Some(start), end_time: Some(end), ..Default::default() };
        let (sql, args) = r.build_sql(&options);
        assert!(sql.contains("event_ts >= ? AND event_ts <= ?"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn zero_limit_means_no_limit_clause() {
        let r = reader();
        let (sql, _) = r.build_sql(&GetRowsOptions::new());
        assert!(!sql.contains("LIMIT"));
    }
}
