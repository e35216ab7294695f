//! PostgreSQL backend for `ColumnStore` (resolves SPEC_FULL §A).
//!
//! Postgres has no notion of asynchronous insert visibility, so the "sync
//! insert" requirement in §6 is satisfied by running the staging insert and
//! the delta statement through the same pool without needing a dedicated
//! flag: an ordinary `INSERT` is immediately visible to the next statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Arguments, Column, PgPool, Row, TypeInfo};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Batch, ColumnMeta, ColumnStore, QueryResult};
use crate::error::EngineError;
use crate::value::{RowMap, Value};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::store("<connect>", None, "connect", e))?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Rewrite the engine's positional `?` placeholders into Postgres's `$n`
/// form. Naive textual substitution: the writer and planner never embed a
/// literal `?` inside a string constant, so this is safe for SQL the
/// engine itself generates.
fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut n = 0usize;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn bind_value(args: &mut PgArguments, v: &Value) -> Result<(), sqlx::error::BoxDynError> {
    match v {
        Value::Null => args.add(None::<String>),
        Value::Bool(b) => args.add(*b),
        Value::I32(i) => args.add(*i),
        Value::I64(i) => args.add(*i),
        Value::F64(f) => args.add(*f),
        Value::String(s) => args.add(s.clone()),
        Value::Timestamp(t) => args.add(*t),
        Value::Uuid(u) => args.add(*u),
    }
}

fn build_arguments(values: &[Value]) -> Result<PgArguments, EngineError> {
    let mut args = PgArguments::default();
    for v in values {
        bind_value(&mut args, v).map_err(|e| {
            EngineError::store("<bind>", None, "bind", sqlx::Error::Encode(e))
        })?;
    }
    Ok(args)
}

fn string_fallback(row: &PgRow, idx: usize) -> Value {
    match row.try_get::<Option<String>, usize>(idx) {
        Ok(Some(s)) => Value::String(s),
        _ => Value::Null,
    }
}

fn scan_column(row: &PgRow, idx: usize, db_type: &str) -> Value {
    match db_type {
        "BOOL" => match row.try_get::<Option<bool>, usize>(idx) {
            Ok(Some(b)) => Value::Bool(b),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        "INT2" | "INT4" => match row.try_get::<Option<i32>, usize>(idx) {
            Ok(Some(v)) => Value::I32(v),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        "INT8" => match row.try_get::<Option<i64>, usize>(idx) {
            Ok(Some(v)) => Value::I64(v),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        "FLOAT4" | "FLOAT8" | "NUMERIC" => match row.try_get::<Option<f64>, usize>(idx) {
            Ok(Some(v)) => Value::F64(v),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        "TIMESTAMPTZ" | "TIMESTAMP" => match row.try_get::<Option<DateTime<Utc>>, usize>(idx) {
            Ok(Some(v)) => Value::Timestamp(v),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        "UUID" => match row.try_get::<Option<Uuid>, usize>(idx) {
            Ok(Some(v)) => Value::Uuid(v),
            Ok(None) => Value::Null,
            Err(_) => string_fallback(row, idx),
        },
        _ => string_fallback(row, idx),
    }
}

fn row_to_map(row: &PgRow) -> RowMap {
    let mut map = RowMap::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value = scan_column(row, idx, col.type_info().name());
        map.insert(col.name().to_string(), value);
    }
    map
}

fn row_columns(row: &PgRow) -> Vec<ColumnMeta> {
    row.columns()
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            db_type: c.type_info().name().to_string(),
        })
        .collect()
}

#[async_trait]
impl ColumnStore for PostgresStore {
    async fn query(
        &self,
        sql: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Result<QueryResult, EngineError> {
        let translated = rewrite_placeholders(sql);
        let arguments = build_arguments(args)?;
        let fut = sqlx::query_with(&translated, arguments).fetch_all(&self.pool);
        let rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::cancelled("<query>", "query")),
            result = fut => result.map_err(|e| EngineError::store("<query>", None, "query", e))?,
        };
        let columns = rows.first().map(row_columns).unwrap_or_default();
        let rows = rows.iter().map(row_to_map).collect();
        Ok(QueryResult { columns, rows })
    }

    async fn execute(
        &self,
        sql: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError> {
        let translated = rewrite_placeholders(sql);
        let arguments = build_arguments(args)?;
        let fut = sqlx::query_with(&translated, arguments).execute(&self.pool);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::cancelled("<execute>", "execute")),
            result = fut => result.map_err(|e| EngineError::store("<execute>", None, "execute", e))?,
        };
        Ok(result.rows_affected())
    }

    async fn prepare_batch(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn Batch>, EngineError> {
        Ok(Box::new(PgBatch {
            pool: self.pool.clone(),
            table: table.to_string(),
            columns: columns.to_vec(),
            rows: Vec::new(),
        }))
    }
}

/// Buffers appended rows in memory and sends them as one multi-row
/// `INSERT` on `send()`, which Postgres commits atomically (§4.6:
/// "on send, the batch is committed atomically").
struct PgBatch {
    pool: PgPool,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl Batch for PgBatch {
    async fn append(&mut self, values: Vec<Value>, cancel: &CancellationToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled(&self.table, "batch-append"));
        }
        if values.len() != self.columns.len() {
            return Err(EngineError::caller_contract(
                &self.table,
                None,
                format!(
                    "row has {} values, table {} expects {}",
                    values.len(),
                    self.table,
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(values);
        Ok(())
    }

    async fn send(self: Box<Self>, cancel: &CancellationToken) -> Result<(), EngineError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let column_list = self.columns.join(", ");
        let mut placeholder_idx = 0usize;
        let mut value_groups = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let placeholders: Vec<String> = row
                .iter()
                .map(|_| {
                    placeholder_idx += 1;
                    format!("${placeholder_idx}")
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES {}",
            self.table,
            value_groups.join(", ")
        );
        let mut arguments = PgArguments::default();
        for row in &self.rows {
            for v in row {
                bind_value(&mut arguments, v)
                    .map_err(|e| EngineError::store(&self.table, None, "batch-send", sqlx::Error::Encode(e)))?;
            }
        }
        let table = self.table.clone();
        let fut = sqlx::query_with(&sql, arguments).execute(&self.pool);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::cancelled(&table, "batch-send")),
            result = fut => {
                result.map_err(|e| EngineError::store(&table, None, "batch-send", e))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_positional_placeholders_in_order() {
        assert_eq!(rewrite_placeholders("WHERE a = ? AND b = ?"), "WHERE a = $1 AND b = $2");
        assert_eq!(rewrite_placeholders("no placeholders"), "no placeholders");
    }
}
