//! Schema DDL helpers (SPEC_FULL §C: "Schema DDL helpers").
//!
//! The engine does not manage migrations generally, but it is the sole
//! writer of its own per-dimension and per-fact tables, so it owns their
//! creation — idempotent `CREATE TABLE IF NOT EXISTS`/`CREATE OR REPLACE
//! VIEW`, issued once, not re-run per write.

use tokio_util::sync::CancellationToken;

use super::{current_view, fact_table, history_table, staging_table, ColumnStore};
use crate::error::EngineError;
use crate::planner::{column_list_sql, current_batch_sql};
use crate::schema::{DimensionSchema, FactSchema};

fn current_batch_columns(schema: &dyn DimensionSchema) -> String {
    column_list_sql(schema)
}

fn pk_and_payload_ddl(schema: &dyn DimensionSchema) -> String {
    let mut cols = Vec::new();
    for c in schema.pk_columns() {
        cols.push(format!("{} {}", c.name, c.sql_type));
    }
    for c in schema.payload_columns() {
        cols.push(format!("{} {}", c.name, c.sql_type));
    }
    cols.join(",\n    ")
}

fn internal_columns_ddl() -> &'static str {
    "entity_id TEXT NOT NULL,\n    \
     snapshot_ts TIMESTAMPTZ NOT NULL,\n    \
     ingested_at TIMESTAMPTZ NOT NULL,\n    \
     op_id UUID NOT NULL,\n    \
     is_deleted SMALLINT NOT NULL,\n    \
     attrs_hash BIGINT NOT NULL"
}

/// Create (if absent) the staging table, history table, and current view
/// for dimension `schema`, in that order.
pub async fn ensure_dimension_tables(
    store: &dyn ColumnStore,
    schema: &dyn DimensionSchema,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let name = schema.name();
    let payload_ddl = pk_and_payload_ddl(schema);

    // `stage_seq` exists only in staging: it records each row's position
    // in the caller's input slice so the delta's duplicate-collapse step
    // has a deterministic tie-break (SPEC_FULL §F.2) when two rows in the
    // same snapshot share the full `(snapshot_ts, ingested_at, op_id)`
    // ordering tuple — the last row in the slice wins.
    let staging_sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    stage_seq INT NOT NULL,\n    {}\n)",
        staging_table(name),
        internal_columns_ddl(),
        payload_ddl
    );
    store.execute(&staging_sql, &[], cancel).await?;

    let history_sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    {}\n)",
        history_table(name),
        internal_columns_ddl(),
        payload_ddl
    );
    store.execute(&history_sql, &[], cancel).await?;

    store
        .execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_entity_order ON {} (entity_id, snapshot_ts DESC, ingested_at DESC, op_id DESC)",
                name,
                history_table(name)
            ),
            &[],
            cancel,
        )
        .await?;
    store
        .execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_op_id ON {} (op_id)",
                name,
                history_table(name)
            ),
            &[],
            cancel,
        )
        .await?;
    store
        .execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_staging_op_id ON {} (op_id)",
                name,
                staging_table(name)
            ),
            &[],
            cancel,
        )
        .await?;

    // The view definition is the canonical current-batch query from the
    // planner, with no entity-id filter, so the view and the planner's ad
    // hoc current-batch reads can never drift apart.
    let view_sql = format!(
        "CREATE OR REPLACE VIEW {} AS {}",
        current_view(name),
        current_batch_sql(name, &current_batch_columns(schema), 0)
    );
    store.execute(&view_sql, &[], cancel).await?;

    Ok(())
}

/// Create (if absent) the fact table named per `schema`.
pub async fn ensure_fact_table(
    store: &dyn ColumnStore,
    schema: &dyn FactSchema,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let cols: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        fact_table(schema.name()),
        cols.join(",\n    ")
    );
    store.execute(&sql, &[], cancel).await?;

    if let Some(time_col) = schema.time_column() {
        store
            .execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                    schema.name(),
                    time_col,
                    fact_table(schema.name()),
                    time_col
                ),
                &[],
                cancel,
            )
            .await?;
    }

    Ok(())
}

/// Delete staging rows older than `older_than` for dimension `name`
/// (SPEC_FULL §F.3: opt-in sweep, never run implicitly).
pub async fn sweep_staging(
    store: &dyn ColumnStore,
    dimension: &str,
    older_than: chrono::Duration,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    let cutoff = chrono::Utc::now() - older_than;
    let sql = format!("DELETE FROM {} WHERE ingested_at < ?", staging_table(dimension));
    store.execute(&sql, &[cutoff.into()], cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_columns_cover_the_six_attributes() {
        let ddl = internal_columns_ddl();
        for col in ["entity_id", "snapshot_ts", "ingested_at", "op_id", "is_deleted", "attrs_hash"] {
            assert!(ddl.contains(col), "missing {col} in DDL");
        }
    }
}
