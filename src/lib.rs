//! Dimensional dataset engine.
//!
//! Ingests snapshots of entity populations into an analytics column store
//! and maintains a queryable slowly-changing-dimension type 2 history plus
//! derived current-state and as-of-time views, alongside a thin
//! fact-table ingestion and query layer sharing the same patterns.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Producers: device/link/metro/validator/gossip snapshot feeds   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    DimensionWriter                                │
//! │     stage snapshot → compute delta → append to history           │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           dim_<D>_history  (SCD2, append-only)                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      DimensionReader (current / as-of, single / batch)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dimlake_engine::{EngineConfig, PostgresStore, SimpleDimensionSchema, DimensionWriter, DimensionRow, OperationConfig};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_file("config/engine.yaml")?;
//! let store = Arc::new(PostgresStore::connect(&config.connection_string()?, config.database.max_connections).await?);
//! let schema = Arc::new(SimpleDimensionSchema::new("device", &["device_id:text"], &["code:text", "name:text"])?);
//! let writer = DimensionWriter::new(store, schema);
//! ```

pub mod config;
pub mod error;
pub mod fact;
pub mod keys;
pub mod planner;
pub mod raw;
pub mod reader;
pub mod scan;
pub mod schema;
pub mod store;
pub mod typed;
pub mod value;
pub mod writer;

pub use config::{DatabaseConfig, DefaultOperationPolicy, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use fact::{FactReader, FactWriter, GetRowsOptions};
pub use raw::RawQuery;
pub use reader::DimensionReader;
pub use scan::{DimensionRecord, FactRecord};
pub use schema::{ColumnDef, DedupMode, DimensionSchema, FactSchema, SimpleDimensionSchema, SimpleFactSchema};
pub use store::{ensure_dimension_tables, ensure_fact_table, sweep_staging, ColumnStore, PostgresStore, QueryResult};
pub use typed::{TypedDimension, TypedFact};
pub use value::{RowMap, Value};
pub use writer::{DimensionRow, DimensionWriter, OperationConfig, WriteOutcome};
