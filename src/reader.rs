//! Dimension reader: the three read shapes, executed against a
//! `ColumnStore` and returned as `RowMap`s. Typed access is layered on top
//! in `typed.rs`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::planner;
use crate::schema::DimensionSchema;
use crate::store::ColumnStore;
use crate::value::{RowMap, Value};

pub struct DimensionReader {
    store: Arc<dyn ColumnStore>,
    schema: Arc<dyn DimensionSchema>,
}

impl DimensionReader {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn DimensionSchema>) -> Self {
        Self { store, schema }
    }

    fn columns(&self) -> String {
        planner::column_list_sql(self.schema.as_ref())
    }

    /// `current-single`: latest row for `entity_id`, or `None` if
    /// absent entirely or if the latest row is a tombstone.
    pub async fn get_current_row(
        &self,
        entity_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<RowMap>, EngineError> {
        let sql = planner::current_single_sql(self.schema.name(), &self.columns());
        let result = self
            .store
            .query(&sql, &[Value::String(entity_id.to_string())], cancel)
            .await?;
        Ok(result.rows.into_iter().next())
    }

    /// `current-batch`: one latest non-tombstone row per entity.
    /// An empty `entity_ids` means "every entity".
    pub async fn get_current_rows(
        &self,
        entity_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<RowMap>, EngineError> {
        let sql = planner::current_batch_sql(self.schema.name(), &self.columns(), entity_ids.len());
        let args: Vec<Value> = entity_ids.iter().map(|id| Value::String(id.clone())).collect();
        let result = self.store.query(&sql, &args, cancel).await?;
        Ok(result.rows)
    }

    /// `as-of-single`: latest row for `entity_id` with
    /// `snapshot_ts <= at`, or `None` if that row is a tombstone.
    pub async fn get_as_of_row(
        &self,
        entity_id: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<RowMap>, EngineError> {
        let sql = planner::as_of_single_sql(self.schema.name(), &self.columns());
        let args = vec![Value::String(entity_id.to_string()), Value::Timestamp(at)];
        let result = self.store.query(&sql, &args, cancel).await?;
        Ok(result.rows.into_iter().next())
    }

    /// `as-of-batch`: per-entity latest row with
    /// `snapshot_ts <= at` that is not a tombstone. An empty `entity_ids`
    /// means "every entity".
    pub async fn get_as_of_rows(
        &self,
        entity_ids: &[String],
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RowMap>, EngineError> {
        let sql = planner::as_of_batch_sql(self.schema.name(), &self.columns(), entity_ids.len());
        let mut args = vec![Value::Timestamp(at)];
        args.extend(entity_ids.iter().map(|id| Value::String(id.clone())));
        let result = self.store.query(&sql, &args, cancel).await?;
        Ok(result.rows)
    }
}
