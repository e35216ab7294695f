//! Dimension and fact schema descriptors.
//!
//! A column is declared as `"name:type"`; the core splits on the first
//! `:` and treats anything else as a configuration error raised at
//! construction, never at write time.

use crate::error::EngineError;

/// One column: its name and its SQL type, as declared by the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDef {
    /// Parse a single `"name:type"` entry.
    pub fn parse(spec: &str, dataset: &str) -> Result<Self, EngineError> {
        match spec.split_once(':') {
            Some((name, sql_type)) if !name.is_empty() && !sql_type.is_empty() => Ok(Self {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
            }),
            _ => Err(EngineError::configuration(
                dataset,
                format!("column spec `{spec}` is not in `name:type` form"),
            )),
        }
    }

    fn parse_list(specs: &[&str], dataset: &str) -> Result<Vec<Self>, EngineError> {
        specs.iter().map(|s| Self::parse(s, dataset)).collect()
    }
}

/// Deduplication strategy for fact tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupMode {
    #[default]
    None,
    ByKey,
    ByVersion,
}

/// Dimension schema contract: a stable name, an ordered PK column list, and
/// an ordered payload column list. Implementations are long-lived and
/// passed by reference — they must be deterministic across calls.
pub trait DimensionSchema: Send + Sync {
    fn name(&self) -> &str;
    fn pk_columns(&self) -> &[ColumnDef];
    fn payload_columns(&self) -> &[ColumnDef];
}

/// Fact schema contract.
pub trait FactSchema: Send + Sync {
    fn name(&self) -> &str;
    fn columns(&self) -> &[ColumnDef];
    fn unique_key_columns(&self) -> &[String];
    /// `None` means no time axis; the planner then builds no default ordering.
    fn time_column(&self) -> Option<&str>;
    fn partition_by_time(&self) -> bool;
    fn dedup_mode(&self) -> DedupMode;
    fn dedup_version_column(&self) -> Option<&str>;
}

/// A concrete `DimensionSchema` built from `"name:type"` column lists.
/// The registration-style schema most callers reach for directly; a
/// caller with more exotic needs can implement `DimensionSchema` by hand.
pub struct SimpleDimensionSchema {
    name: String,
    pk: Vec<ColumnDef>,
    payload: Vec<ColumnDef>,
}

impl SimpleDimensionSchema {
    pub fn new(name: impl Into<String>, pk: &[&str], payload: &[&str]) -> Result<Self, EngineError> {
        let name = name.into();
        if pk.is_empty() {
            return Err(EngineError::configuration(
                &name,
                "a dimension schema needs at least one primary-key column",
            ));
        }
        let pk = ColumnDef::parse_list(pk, &name)?;
        let payload = ColumnDef::parse_list(payload, &name)?;
        Ok(Self { name, pk, payload })
    }
}

impl DimensionSchema for SimpleDimensionSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn pk_columns(&self) -> &[ColumnDef] {
        &self.pk
    }

    fn payload_columns(&self) -> &[ColumnDef] {
        &self.payload
    }
}

/// A concrete `FactSchema` built from a `"name:type"` column list.
pub struct SimpleFactSchema {
    name: String,
    columns: Vec<ColumnDef>,
    unique_key: Vec<String>,
    time_column: Option<String>,
    partition_by_time: bool,
    dedup_mode: DedupMode,
    dedup_version_column: Option<String>,
}

impl SimpleFactSchema {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Result<Self, EngineError> {
        let name = name.into();
        if columns.is_empty() {
            return Err(EngineError::configuration(&name, "a fact schema needs at least one column"));
        }
        let columns = ColumnDef::parse_list(columns, &name)?;
        Ok(Self {
            name,
            columns,
            unique_key: Vec::new(),
            time_column: None,
            partition_by_time: false,
            dedup_mode: DedupMode::None,
            dedup_version_column: None,
        })
    }

    pub fn with_time_column(mut self, column: impl Into<String>) -> Result<Self, EngineError> {
        let column = column.into();
        if !self.columns.iter().any(|c| c.name == column) {
            return Err(EngineError::configuration(
                &self.name,
                format!("time column `{column}` is not in the declared column list"),
            ));
        }
        self.time_column = Some(column);
        Ok(self)
    }

    pub fn with_partition_by_time(mut self, enabled: bool) -> Self {
        self.partition_by_time = enabled;
        self
    }

    pub fn with_unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_key = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_dedup(mut self, mode: DedupMode, version_column: Option<&str>) -> Self {
        self.dedup_mode = mode;
        self.dedup_version_column = version_column.map(|s| s.to_string());
        self
    }
}

impl FactSchema for SimpleFactSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn unique_key_columns(&self) -> &[String] {
        &self.unique_key
    }

    fn time_column(&self) -> Option<&str> {
        self.time_column.as_deref()
    }

    fn partition_by_time(&self) -> bool {
        self.partition_by_time
    }

    fn dedup_mode(&self) -> DedupMode {
        self.dedup_mode
    }

    fn dedup_version_column(&self) -> Option<&str> {
        self.dedup_version_column.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_columns() {
        let schema = SimpleDimensionSchema::new("device", &["pk:string"], &["code:string", "name:string"]).unwrap();
        assert_eq!(schema.pk_columns().len(), 1);
        assert_eq!(schema.payload_columns().len(), 2);
        assert_eq!(schema.payload_columns()[0].sql_type, "string");
    }

    #[test]
    fn rejects_malformed_column_spec() {
        let err = SimpleDimensionSchema::new("device", &["pk"], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn rejects_empty_pk() {
        let err = SimpleDimensionSchema::new("device", &[], &["code:string"]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn fact_schema_rejects_unknown_time_column() {
        let schema = SimpleFactSchema::new("gossip_events", &["node_id:string", "event_ts:datetime"]).unwrap();
        assert!(schema.with_time_column("missing").is_err());
    }

    #[test]
    fn fact_schema_accepts_declared_time_column() {
        let schema = SimpleFactSchema::new("gossip_events", &["node_id:string", "event_ts:datetime"])
            .unwrap()
            .with_time_column("event_ts")
            .unwrap();
        assert_eq!(schema.time_column(), Some("event_ts"));
    }
}
