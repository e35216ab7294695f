//! Typed facades: generic wrappers mapping a caller record type onto a
//! dimension or fact dataset via `scan::DimensionRecord` /
//! `scan::FactRecord`.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::fact::{FactReader, FactWriter, GetRowsOptions};
use crate::reader::DimensionReader;
use crate::scan::{DimensionRecord, FactRecord};
use crate::schema::{DimensionSchema, FactSchema};
use crate::store::ColumnStore;
use crate::value::RowMap;
use crate::writer::{DimensionRow, DimensionWriter, OperationConfig, WriteOutcome};

/// A dimension dataset accessed through record type `T`.
pub struct TypedDimension<T: DimensionRecord> {
    writer: DimensionWriter,
    reader: DimensionReader,
    schema: Arc<dyn DimensionSchema>,
    _marker: PhantomData<T>,
}

impl<T: DimensionRecord> TypedDimension<T> {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn DimensionSchema>) -> Self {
        Self {
            writer: DimensionWriter::new(store.clone(), schema.clone()),
            reader: DimensionReader::new(store, schema.clone()),
            schema,
            _marker: PhantomData,
        }
    }

    fn to_row(&self, record: &T) -> DimensionRow {
        let pk_names: Vec<&str> = self.schema.pk_columns().iter().map(|c| c.name.as_str()).collect();
        let payload_names: Vec<&str> = self.schema.payload_columns().iter().map(|c| c.name.as_str()).collect();
        let mut values = record.column_values(&pk_names, &payload_names);
        let payload = values.split_off(pk_names.len());
        DimensionRow::new(values, payload)
    }

    pub async fn write(
        &self,
        records: &[T],
        config: OperationConfig,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, EngineError> {
        let rows: Vec<DimensionRow> = records.iter().map(|r| self.to_row(r)).collect();
        self.writer.write(&rows, config, cancel).await
    }

    pub async fn get_current(&self, entity_id: &str, cancel: &CancellationToken) -> Result<Option<T>, EngineError> {
        match self.reader.get_current_row(entity_id, cancel).await? {
            Some(row) => Ok(Some(T::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_current_batch(
        &self,
        entity_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, EngineError> {
        rows_to_records(self.reader.get_current_rows(entity_ids, cancel).await?)
    }

    pub async fn get_as_of(
        &self,
        entity_id: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, EngineError> {
        match self.reader.get_as_of_row(entity_id, at, cancel).await? {
            Some(row) => Ok(Some(T::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_as_of_batch(
        &self,
        entity_ids: &[String],
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, EngineError> {
        rows_to_records(self.reader.get_as_of_rows(entity_ids, at, cancel).await?)
    }
}

fn rows_to_records<T: DimensionRecord>(rows: Vec<RowMap>) -> Result<Vec<T>, EngineError> {
    rows.iter().map(T::from_row).collect()
}

/// A fact dataset accessed through record type `T`.
pub struct TypedFact<T: FactRecord> {
    writer: FactWriter,
    reader: FactReader,
    schema: Arc<dyn FactSchema>,
    _marker: PhantomData<T>,
}

impl<T: FactRecord> TypedFact<T> {
    pub fn new(store: Arc<dyn ColumnStore>, schema: Arc<dyn FactSchema>) -> Self {
        Self {
            writer: FactWriter::new(store.clone(), schema.clone()),
            reader: FactReader::new(store, schema.clone()),
            schema,
            _marker: PhantomData,
        }
    }

    pub async fn write(&self, records: &[T], cancel: &CancellationToken) -> Result<u64, EngineError> {
        let names: Vec<&str> = self.schema.columns().iter().map(|c| c.name.as_str()).collect();
        let rows: Vec<Vec<crate::value::Value>> = records.iter().map(|r| r.column_values(&names)).collect();
        self.writer.append(&rows, cancel).await
    }

    pub async fn get_rows(&self, options: &GetRowsOptions, cancel: &CancellationToken) -> Result<Vec<T>, EngineError> {
        let rows = self.reader.get_rows(options, cancel).await?;
        rows.iter().map(T::from_row).collect()
    }
}
