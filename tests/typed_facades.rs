//! Round-trip coverage for the typed facades (§4.7): a caller's own
//! `DimensionRecord`/`FactRecord` implementation, written through
//! `TypedDimension`/`TypedFact` and read back, exercising the
//! `scan::require_string`/`optional_string`/`column_value_or_null` helpers
//! those implementations are expected to use.

use std::sync::Arc;

use chrono::Utc;
use dimlake_engine::scan::{column_value_or_null, optional_string, require_string};
use dimlake_engine::{
    ensure_dimension_tables, ensure_fact_table, DimensionRecord, EngineError, FactRecord,
    GetRowsOptions, OperationConfig, PostgresStore, RowMap, SimpleDimensionSchema,
    SimpleFactSchema, TypedDimension, TypedFact, Value,
};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct DeviceRecord {
    pk: String,
    code: String,
    name: Option<String>,
}

impl DimensionRecord for DeviceRecord {
    fn from_row(row: &RowMap) -> Result<Self, EngineError> {
        Ok(Self {
            pk: require_string(row, "pk", "Pk")?,
            code: require_string(row, "code", "Code")?,
            name: optional_string(row, "name"),
        })
    }

    fn column_values(&self, pk_columns: &[&str], payload_columns: &[&str]) -> Vec<Value> {
        let mut values = RowMap::new();
        values.insert("pk".to_string(), Value::String(self.pk.clone()));
        values.insert("code".to_string(), Value::String(self.code.clone()));
        if let Some(name) = &self.name {
            values.insert("name".to_string(), Value::String(name.clone()));
        }
        pk_columns
            .iter()
            .chain(payload_columns.iter())
            .map(|c| column_value_or_null(&values, c))
            .collect()
    }
}

fn device_schema() -> Arc<SimpleDimensionSchema> {
    Arc::new(SimpleDimensionSchema::new("device", &["pk:text"], &["code:text", "name:text"]).unwrap())
}

#[sqlx::test]
async fn typed_dimension_round_trip(pool: PgPool) {
    let store = Arc::new(PostgresStore::with_pool(pool));
    let schema = device_schema();
    let cancel = CancellationToken::new();
    ensure_dimension_tables(store.as_ref(), schema.as_ref(), &cancel).await.unwrap();

    let typed: TypedDimension<DeviceRecord> = TypedDimension::new(store.clone(), schema.clone());
    let record = DeviceRecord { pk: "e1".to_string(), code: "C1".to_string(), name: Some("N1".to_string()) };
    let config = OperationConfig::builder().op_id(Uuid::new_v4()).build();
    typed.write(&[record], config, &cancel).await.unwrap();

    let entity_id = dimlake_engine::keys::encode(&[Value::String("e1".to_string())]);
    let current = typed.get_current(&entity_id, &cancel).await.unwrap().unwrap();
    assert_eq!(current.pk, "e1");
    assert_eq!(current.code, "C1");
    assert_eq!(current.name.as_deref(), Some("N1"));
}

/// A record field left unset at construction must land as `Value::Null`
/// in the written row, and must come back as `None` on read — the
/// "missing record fields emit zero values" rule of §4.7.
#[sqlx::test]
async fn typed_dimension_missing_field_round_trips_as_null(pool: PgPool) {
    let store = Arc::new(PostgresStore::with_pool(pool));
    let schema = device_schema();
    let cancel = CancellationToken::new();
    ensure_dimension_tables(store.as_ref(), schema.as_ref(), &cancel).await.unwrap();

    let typed: TypedDimension<DeviceRecord> = TypedDimension::new(store.clone(), schema.clone());
    let record = DeviceRecord { pk: "e2".to_string(), code: "C2".to_string(), name: None };
    let config = OperationConfig::builder().op_id(Uuid::new_v4()).build();
    typed.write(&[record], config, &cancel).await.unwrap();

    let entity_id = dimlake_engine::keys::encode(&[Value::String("e2".to_string())]);
    let current = typed.get_current(&entity_id, &cancel).await.unwrap().unwrap();
    assert_eq!(current.name, None);
}

struct GossipEventRecord {
    node_id: String,
    event_ts: chrono::DateTime<Utc>,
    kind: String,
}

impl FactRecord for GossipEventRecord {
    fn from_row(row: &RowMap) -> Result<Self, EngineError> {
        let event_ts = row
            .get("event_ts")
            .and_then(Value::as_timestamp)
            .ok_or_else(|| EngineError::DataDrift {
                column: "event_ts".to_string(),
                db_type: row.get("event_ts").map(Value::type_name).unwrap_or("missing").to_string(),
                field: "EventTs".to_string(),
                message: "cannot convert column to timestamp".to_string(),
            })?;
        Ok(Self {
            node_id: require_string(row, "node_id", "NodeId")?,
            event_ts,
            kind: require_string(row, "kind", "Kind")?,
        })
    }

    fn column_values(&self, columns: &[&str]) -> Vec<Value> {
        let mut values = RowMap::new();
        values.insert("node_id".to_string(), Value::String(self.node_id.clone()));
        values.insert("event_ts".to_string(), Value::Timestamp(self.event_ts));
        values.insert("kind".to_string(), Value::String(self.kind.clone()));
        columns.iter().map(|c| column_value_or_null(&values, c)).collect()
    }
}

#[sqlx::test]
async fn typed_fact_round_trip(pool: PgPool) {
    let store = Arc::new(PostgresStore::with_pool(pool));
    let schema = Arc::new(
        SimpleFactSchema::new("gossip_events", &["node_id:text", "event_ts:timestamptz", "kind:text"])
            .unwrap()
            .with_time_column("event_ts")
            .unwrap(),
    );
    let cancel = CancellationToken::new();
    ensure_fact_table(store.as_ref(), schema.as_ref(), &cancel).await.unwrap();

    let typed: TypedFact<GossipEventRecord> = TypedFact::new(store.clone(), schema.clone());
    let record = GossipEventRecord { node_id: "n1".to_string(), event_ts: Utc::now(), kind: "join".to_string() };
    let written = typed.write(&[record], &cancel).await.unwrap();
    assert_eq!(written, 1);

    let rows = typed.get_rows(&GetRowsOptions::new(), &cancel).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].node_id, "n1");
    assert_eq!(rows[0].kind, "join");
}
