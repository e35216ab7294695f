//! Raw query surface: executes arbitrary SQL and returns
//! `{columns, column_metadata, rows, count}`. This is the surface the
//! agent/LLM tooling talks to; the engine does not attempt to sandbox
//! the SQL it is handed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::store::{ColumnStore, QueryResult};
use crate::value::Value;

pub struct RawQuery {
    store: Arc<dyn ColumnStore>,
}

impl RawQuery {
    pub fn new(store: Arc<dyn ColumnStore>) -> Self {
        Self { store }
    }

    /// Execute `sql` with positional `args` and return rows plus column
    /// metadata (including each column's database type name, so callers
    /// can interpret nullables themselves).
    pub async fn query(&self, sql: &str, args: &[Value], cancel: &CancellationToken) -> Result<QueryResult, EngineError> {
        self.store.query(sql, args, cancel).await
    }
}
