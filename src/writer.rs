//! Dimension writer — the two-stage ingestion protocol (§4.5).
//!
//! The hardest component in the engine. Owns idempotency (§4.5.2), staging
//! (§4.5.3), the delta CTE (§4.5.4), cleanup (§4.5.5), the empty-snapshot
//! shortcut (§4.5.6), and the failure semantics of §4.5.7.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::EngineError;
use crate::keys;
use crate::planner::column_names;
use crate::schema::DimensionSchema;
use crate::store::{history_table, staging_table, ColumnStore, INTERNAL_COLUMNS};
use crate::value::Value;

/// One row supplied to `DimensionWriter::write`: PK values followed by
/// payload values, in the schema's declared column order.
#[derive(Debug, Clone)]
pub struct DimensionRow {
    pub pk: Vec<Value>,
    pub payload: Vec<Value>,
}

impl DimensionRow {
    pub fn new(pk: Vec<Value>, payload: Vec<Value>) -> Self {
        Self { pk, payload }
    }
}

/// Truncate a timestamp to millisecond precision (§4.5.1, §3 invariant 7).
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(dt.timestamp_millis()).single().unwrap_or(dt)
}

/// Per-write options (§4.5.1). Built via `OperationConfig::builder()` —
/// no sentinel values, no hidden mutation of a caller-supplied struct
/// (SPEC_FULL §9 design note).
#[derive(Debug, Clone)]
pub struct OperationConfig {
    pub op_id: Uuid,
    pub snapshot_ts: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub missing_means_deleted: bool,
    pub cleanup_staging: bool,
}

impl OperationConfig {
    pub fn builder() -> OperationConfigBuilder {
        OperationConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct OperationConfigBuilder {
    op_id: Option<Uuid>,
    snapshot_ts: Option<DateTime<Utc>>,
    ingested_at: Option<DateTime<Utc>>,
    missing_means_deleted: Option<bool>,
    cleanup_staging: Option<bool>,
}

impl OperationConfigBuilder {
    pub fn op_id(mut self, op_id: Uuid) -> Self {
        self.op_id = Some(op_id);
        self
    }

    pub fn snapshot_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.snapshot_ts = Some(ts);
        self
    }

    pub fn ingested_at(mut self, ts: DateTime<Utc>) -> Self {
        self.ingested_at = Some(ts);
        self
    }

    pub fn missing_means_deleted(mut self, value: bool) -> Self {
        self.missing_means_deleted = Some(value);
        self
    }

    pub fn cleanup_staging(mut self, value: bool) -> Self {
        self.cleanup_staging = Some(value);
        self
    }

    pub fn build(self) -> OperationConfig {
        let now = truncate_to_millis(Utc::now());
        OperationConfig {
            op_id: self.op_id.unwrap_or_else(Uuid::new_v4),
            snapshot_ts: self.snapshot_ts.map(truncate_to_millis).unwrap_or(now),
            ingested_at: self.ingested_at.map(truncate_to_millis).unwrap_or(now),
            missing_means_deleted: self.missing_means_deleted.unwrap_or(false),
            cleanup_staging: self.cleanup_staging.unwrap_or(true),
        }
    }
}

/// Outcome of a single `write` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// True if this call short-circuited on the idempotency probe
    /// (§4.5.2) — history was not touched by this call.
    pub idempotent_replay: bool,
    /// Rows appended to history by this call (0 on idempotent replay, on
    /// a no-op empty write, and when the delta proposes nothing new).
    pub rows_appended: u64,
}

/// Turns a Postgres MD5-hex digest of the payload columns (plus the
/// deletion flag) into a signed 64-bit `attrs_hash`, computed entirely in
/// SQL so the delta statement never needs to call back into Rust mid
/// query. This is a different concrete hash than `keys::attrs_hash` (xxh3,
/// used for in-memory comparisons and by typed facades) — both only need
/// to be deterministic functions of `(payload, is_deleted)`, not bit
/// compatible with each other.
fn attrs_hash_sql_expr(payload_columns: &[String], is_deleted_literal: &str) -> String {
    let mut parts: Vec<String> = payload_columns
        .iter()
        .map(|c| format!("coalesce({c}::text, '\u{2400}')"))
        .collect();
    parts.push(format!("'{is_deleted_literal}'"));
    let concatenated = format!("concat_ws('|', {})", parts.join(", "));
    format!("(('x' || substr(md5({concatenated}), 1, 16))::bit(64)::bigint)")
}

struct Columns {
    full: Vec<String>,
    pk: Vec<String>,
    payload: Vec<String>,
}

fn columns_of(schema: &dyn DimensionSchema) -> Columns {
    Columns {
        full: column_names(schema),
        pk: schema.pk_columns().iter().map(|c| c.name.clone()).collect(),
        payload: schema.payload_columns().iter().map(|c| c.name.clone()).collect(),
    }
}

/// Build the single INSERT ... SELECT delta statement (§4.5.4) plus its
/// positional arguments, in the exact order the `?` placeholders appear.
fn build_delta_sql(
    dimension: &str,
    cols: &Columns,
    config: &OperationConfig,
) -> (String, Vec<Value>) {
    let history = history_table(dimension);
    let staging = staging_table(dimension);
    let full_list = cols.full.join(", ");
    let pk_payload_list = cols
        .pk
        .iter()
        .chain(cols.payload.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let la_pk_payload_list = cols
        .pk
        .iter()
        .chain(cols.payload.iter())
        .map(|c| format!("la.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut args = Vec::new();

    let active_hash_expr = attrs_hash_sql_expr(&cols.payload, "0");
    let tombstone_hash_expr = attrs_hash_sql_expr(&cols.payload, "1");

    args.push(Value::Uuid(config.op_id)); // staging_raw: op_id
    args.push(Value::Timestamp(config.snapshot_ts)); // latest: snapshot_ts <= ?

    let mut sql = format!(
        "WITH staging_raw AS (\n  \
            SELECT {full_list}, stage_seq FROM {staging} WHERE op_id = ?\n\
         ),\n\
         staging_agg AS (\n  \
            SELECT DISTINCT ON (entity_id) {full_list}\n  \
            FROM staging_raw\n  \
            ORDER BY entity_id, snapshot_ts DESC, ingested_at DESC, op_id DESC, stage_seq DESC\n\
         ),\n\
         staging AS (\n  \
            SELECT entity_id, snapshot_ts, ingested_at, op_id, 0::smallint AS is_deleted,\n         \
                {active_hash_expr} AS attrs_hash,\n         \
                {pk_payload_list}\n  \
            FROM staging_agg\n\
         ),\n\
         latest AS (\n  \
            SELECT DISTINCT ON (entity_id) {full_list}\n  \
            FROM {history}\n  \
            WHERE snapshot_ts <= ?\n  \
            ORDER BY entity_id, snapshot_ts DESC, ingested_at DESC, op_id DESC\n\
         ),\n\
         latest_active AS (\n  \
            SELECT * FROM latest WHERE is_deleted = 0\n\
         )\n\
         INSERT INTO {history} ({full_list})\n\
         SELECT s.entity_id, s.snapshot_ts, s.ingested_at, s.op_id, s.is_deleted, s.attrs_hash, {s_pk_payload}\n\
         FROM staging s\n\
         LEFT JOIN latest_active la ON la.entity_id = s.entity_id\n\
         WHERE la.entity_id IS NULL OR la.attrs_hash <> s.attrs_hash",
        s_pk_payload = cols
            .pk
            .iter()
            .chain(cols.payload.iter())
            .map(|c| format!("s.{c}"))
            .collect::<Vec<_>>()
            .join(", "),
    );

    if config.missing_means_deleted {
        sql.push_str(&format!(
            "\nUNION ALL\n\
             SELECT la.entity_id, ?, ?, ?, 1::smallint, {tombstone_hash_expr}, {la_pk_payload_list}\n\
             FROM latest_active la\n\
             LEFT JOIN staging s ON s.entity_id = la.entity_id\n\
             WHERE s.entity_id IS NULL",
        ));
        args.push(Value::Timestamp(config.snapshot_ts));
        args.push(Value::Timestamp(config.ingested_at));
        args.push(Value::Uuid(config.op_id));
    }

    (sql, args)
}

/// Build the empty-snapshot tombstone-everything statement (§4.5.6), used
/// when the caller supplies zero rows and `missing_means_deleted = true`.
fn build_empty_snapshot_delta_sql(
    dimension: &str,
    cols: &Columns,
    config: &OperationConfig,
) -> (String, Vec<Value>) {
    let history = history_table(dimension);
    let full_list = cols.full.join(", ");
    let la_pk_payload_list = cols
        .pk
        .iter()
        .chain(cols.payload.iter())
        .map(|c| format!("la.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let tombstone_hash_expr = attrs_hash_sql_expr(&cols.payload, "1");

    let sql = format!(
        "INSERT INTO {history} ({full_list})\n\
         SELECT la.entity_id, ?, ?, ?, 1::smallint, {tombstone_hash_expr}, {la_pk_payload_list}\n\
         FROM (\n  \
            SELECT DISTINCT ON (entity_id) {full_list}\n  \
            FROM {history}\n  \
            WHERE snapshot_ts <= ?\n  \
            ORDER BY entity_id, snapshot_ts DESC, ingested_at DESC, op_id DESC\n\
         ) la\n\
         WHERE la.is_deleted = 0",
    );
    let args = vec![
        Value::Timestamp(config.snapshot_ts),
        Value::Timestamp(config.ingested_at),
        Value::Uuid(config.op_id),
        Value::Timestamp(config.snapshot_ts),
    ];
    (sql, args)
}

pub struct DimensionWriter {
    store: Arc<dyn ColumnStore>,
    schema: Arc<dyn DimensionSchema>,
}

impl DimensionWriter {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn DimensionSchema>) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &Arc<dyn DimensionSchema> {
        &self.schema
    }

    /// Apply one ingestion operation. See §4.5 for the full protocol.
    pub async fn write(
        &self,
        rows: &[DimensionRow],
        config: OperationConfig,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, EngineError> {
        let dimension = self.schema.name();

        for row in rows {
            if row.pk.len() != self.schema.pk_columns().len()
                || row.payload.len() != self.schema.payload_columns().len()
            {
                return Err(EngineError::caller_contract(
                    dimension,
                    Some(config.op_id),
                    "row column count does not match schema's PK/payload column count",
                ));
            }
        }

        // Step 0: idempotency probe.
        let probe_sql = format!("SELECT entity_id FROM {} WHERE op_id = ? LIMIT 1", history_table(dimension));
        let probe = self
            .store
            .query(&probe_sql, &[Value::Uuid(config.op_id)], cancel)
            .await?;
        if !probe.rows.is_empty() {
            tracing::debug!(dataset = dimension, op_id = %config.op_id, "idempotency probe hit, skipping");
            return Ok(WriteOutcome { idempotent_replay: true, rows_appended: 0 });
        }

        let cols = columns_of(self.schema.as_ref());

        // Step 0.5 / §4.5.6: empty-snapshot shortcut.
        if rows.is_empty() {
            if !config.missing_means_deleted {
                return Ok(WriteOutcome { idempotent_replay: false, rows_appended: 0 });
            }
            let (sql, args) = build_empty_snapshot_delta_sql(dimension, &cols, &config);
            let affected = self.store.execute(&sql, &args, cancel).await?;
            self.warn_if_high_deletion_ratio(dimension, affected, cancel).await;
            return Ok(WriteOutcome { idempotent_replay: false, rows_appended: affected });
        }

        // Step 1: stage.
        let staging_columns: Vec<String> = INTERNAL_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once("stage_seq".to_string()))
            .chain(cols.pk.iter().cloned())
            .chain(cols.payload.iter().cloned())
            .collect();
        let mut batch = self
            .store
            .prepare_batch(&staging_table(dimension), &staging_columns)
            .await?;
        for (seq, row) in rows.iter().enumerate() {
            let entity_id = keys::encode(&row.pk);
            let mut values = vec![
                Value::String(entity_id),
                Value::Timestamp(config.snapshot_ts),
                Value::Timestamp(config.ingested_at),
                Value::Uuid(config.op_id),
                Value::I32(0),
                Value::I64(0),
                Value::I32(seq as i32),
            ];
            values.extend(row.pk.clone());
            values.extend(row.payload.clone());
            if let Err(e) = batch.append(values, cancel).await {
                return Err(e);
            }
        }
        batch.send(cancel).await?;

        // Visibility check: catches async-insert misconfiguration / data
        // visibility bugs instead of silently writing an empty delta.
        let count_sql = format!("SELECT COUNT(*) AS cnt FROM {} WHERE op_id = ?", staging_table(dimension));
        let count_result = self.store.query(&count_sql, &[Value::Uuid(config.op_id)], cancel).await?;
        let visible = count_result
            .rows
            .first()
            .and_then(|r| r.get("cnt"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if visible == 0 {
            return Err(EngineError::caller_contract(
                dimension,
                Some(config.op_id),
                "staging rows not visible after batch send (zero rows counted for this op_id); aborting before delta",
            ));
        }
        if visible != rows.len() as i64 {
            tracing::warn!(
                dataset = dimension,
                op_id = %config.op_id,
                expected = rows.len(),
                visible,
                "staging visibility count mismatch"
            );
        }

        // Step 2: delta.
        let (sql, args) = build_delta_sql(dimension, &cols, &config);
        let affected = self.store.execute(&sql, &args, cancel).await?;
        self.warn_if_high_deletion_ratio(dimension, affected, cancel).await;

        // Step 3: cleanup.
        if config.cleanup_staging {
            let cleanup_sql = format!("DELETE FROM {} WHERE op_id = ?", staging_table(dimension));
            if let Err(e) = self.store.execute(&cleanup_sql, &[Value::Uuid(config.op_id)], cancel).await {
                tracing::warn!(dataset = dimension, op_id = %config.op_id, error = %e, "staging cleanup failed, relying on TTL sweep");
            }
        }

        Ok(WriteOutcome { idempotent_replay: false, rows_appended: affected })
    }

    /// §4.5.7: "Bugs that cause the delta to propose a suspiciously large
    /// number of deletions (> 50% of the population) should be logged at
    /// warn level; the engine does not refuse the write."
    async fn warn_if_high_deletion_ratio(&self, dimension: &str, _rows_affected: u64, cancel: &CancellationToken) {
        let tombstone_sql = format!(
            "SELECT COUNT(*) AS cnt FROM {} WHERE is_deleted = 1",
            history_table(dimension)
        );
        let population_sql = format!("SELECT COUNT(*) AS cnt FROM {}", crate::store::current_view(dimension));
        let (Ok(tombstones), Ok(population)) = (
            self.store.query(&tombstone_sql, &[], cancel).await,
            self.store.query(&population_sql, &[], cancel).await,
        ) else {
            return;
        };
        let tombstones = tombstones.rows.first().and_then(|r| r.get("cnt")).and_then(|v| v.as_i64()).unwrap_or(0);
        let population = population.rows.first().and_then(|r| r.get("cnt")).and_then(|v| v.as_i64()).unwrap_or(0);
        if population > 0 && tombstones as f64 / population as f64 > 0.5 {
            tracing::warn!(
                dataset = dimension,
                tombstones,
                population,
                "delta proposed deleting more than 50% of the active population"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SimpleDimensionSchema;

    fn schema() -> SimpleDimensionSchema {
        SimpleDimensionSchema::new("device", &["pk:text"], &["code:text", "name:text"]).unwrap()
    }

    fn sample_config() -> OperationConfig {
        OperationConfig::builder()
            .op_id(Uuid::nil())
            .snapshot_ts(Utc.timestamp_millis_opt(10_000).unwrap())
            .ingested_at(Utc.timestamp_millis_opt(10_000).unwrap())
            .build()
    }

    #[test]
    fn builder_defaults_missing_means_deleted_to_false() {
        let config = OperationConfig::builder().build();
        assert!(!config.missing_means_deleted);
        assert!(config.cleanup_staging);
    }

    #[test]
    fn builder_truncates_explicit_timestamps_to_millis() {
        let with_micros = Utc.timestamp_millis_opt(10_123).unwrap() + chrono::Duration::microseconds(456);
        let config = OperationConfig::builder().snapshot_ts(with_micros).build();
        assert_eq!(config.snapshot_ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn delta_sql_without_tombstones_has_two_placeholders() {
        let schema = schema();
        let cols = columns_of(&schema);
        let config = sample_config();
        let (sql, args) = build_delta_sql("device", &cols, &config);
        assert_eq!(sql.matches('?').count(), 2);
        assert_eq!(args.len(), 2);
        assert!(!sql.contains("UNION ALL"));
    }

    #[test]
    fn delta_sql_with_tombstones_adds_deleted_arm() {
        let schema = schema();
        let cols = columns_of(&schema);
        let mut config = sample_config();
        config.missing_means_deleted = true;
        let (sql, args) = build_delta_sql("device", &cols, &config);
        assert!(sql.contains("UNION ALL"));
        assert_eq!(sql.matches('?').count(), 5);
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn attrs_hash_expr_embeds_every_payload_column() {
        let expr = attrs_hash_sql_expr(&["code".to_string(), "name".to_string()], "0");
        assert!(expr.contains("code"));
        assert!(expr.contains("name"));
        assert!(expr.contains("md5"));
    }

    #[test]
    fn staging_dedup_tiebreak_orders_by_stage_seq_descending() {
        let schema = schema();
        let cols = columns_of(&schema);
        let (sql, _) = build_delta_sql("device", &cols, &sample_config());
        assert!(sql.contains("stage_seq DESC"));
    }
}
