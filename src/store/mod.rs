//! Column store abstraction: a ClickHouse-shaped driver contract —
//! `Query`, `Exec`, `PrepareBatch(...).Append(...).Send()` — with a "sync
//! insert" hint so a batch append is visible to the very next statement
//! on the same logical connection. Kept as a trait with one concrete
//! backend, Postgres via `sqlx` (see `postgres.rs`), where "sync insert"
//! is satisfied trivially by running the stage and the delta on the same
//! transaction.

pub mod ddl;
pub mod postgres;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::value::{RowMap, Value};

pub use ddl::{ensure_dimension_tables, ensure_fact_table, sweep_staging};
pub use postgres::PostgresStore;

/// Database type name alongside a column's name, for raw-query metadata
/// and for `DataDrift` error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub db_type: String,
}

/// Result of a `query` call: column metadata plus fully-materialized rows.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<RowMap>,
}

impl QueryResult {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// A prepared batch handle for appending rows to a single table.
///
/// The caller must release the handle on every exit path; in Rust
/// this falls naturally out of `Batch` being consumed by `send` or simply
/// dropped on an early return/error.
#[async_trait]
pub trait Batch: Send {
    /// Append one row. `values` must match the column list the batch was
    /// prepared with, in order. A cancelled `cancel` aborts the append
    /// without buffering the row (§5: the batch append is a suspension
    /// point and must be abandoned on cancel).
    async fn append(&mut self, values: Vec<Value>, cancel: &CancellationToken) -> Result<(), EngineError>;

    /// Commit the batch atomically and release the handle. A cancelled
    /// `cancel` abandons the in-flight send rather than waiting for it.
    async fn send(self: Box<Self>, cancel: &CancellationToken) -> Result<(), EngineError>;
}

/// The column store connection contract.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Execute a query, binding `args` positionally to `?` placeholders,
    /// and return materialized rows plus column metadata.
    async fn query(
        &self,
        sql: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Result<QueryResult, EngineError>;

    /// Execute a statement with no result rows, returning the number of
    /// rows affected.
    async fn execute(
        &self,
        sql: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError>;

    /// Prepare a batch append handle against `table`'s `columns`, in
    /// order. Rows appended through this handle must become visible to the
    /// very next `execute`/`query` issued against the same dataset (the
    /// "sync insert" contract).
    async fn prepare_batch(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn Batch>, EngineError>;
}

/// Canonical table names, bit-exact for compatibility with existing
/// downstream SQL.
pub fn staging_table(dimension: &str) -> String {
    format!("stg_dim_{dimension}_snapshot")
}

pub fn history_table(dimension: &str) -> String {
    format!("dim_{dimension}_history")
}

pub fn current_view(dimension: &str) -> String {
    format!("dim_{dimension}_current")
}

pub fn fact_table(name: &str) -> String {
    format!("fact_{name}")
}

/// The six internal columns every dimension history/staging row carries,
/// in the fixed order used throughout the INSERT/SELECT column lists
/// built from the same source of truth as the writer's INSERT and the
/// planner's SELECT, so the three never drift apart.
pub const INTERNAL_COLUMNS: [&str; 6] = [
    "entity_id",
    "snapshot_ts",
    "ingested_at",
    "op_id",
    "is_deleted",
    "attrs_hash",
];
