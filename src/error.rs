//! Engine error taxonomy.
//!
//! Four categories per the engine's error handling design: configuration
//! errors (raised at construction), caller-contract errors (raised at
//! write/read time), store errors (propagated from the column store with
//! context), and data-drift errors (raised on typed scan mismatches).

use uuid::Uuid;

/// The engine's single error type.
///
/// Every variant that can be attributed to a specific dataset or operation
/// carries that context so a caller can correlate a failure with the
/// `op_id` and stage that produced it (per the propagation policy).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed schema column definition, e.g. a `"name"` entry with no
    /// `:type` suffix, or a mismatched PK/payload column count.
    #[error("configuration error in schema `{dataset}`: {message}")]
    Configuration { dataset: String, message: String },

    /// Caller supplied a row with the wrong column count, referenced an
    /// unknown dataset, or the call was cancelled.
    #[error("caller contract violation in `{dataset}` (op_id={op_id:?}): {message}")]
    CallerContract {
        dataset: String,
        op_id: Option<Uuid>,
        message: String,
    },

    /// The column store rejected a statement, a batch failed to send, or
    /// staged rows were not visible to the subsequent delta statement.
    #[error("store error in `{dataset}` (op_id={op_id:?}) during {stage}: {source}")]
    Store {
        dataset: String,
        op_id: Option<Uuid>,
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A typed scan could not convert a database value to the target field
    /// type. Never swallowed: schema drift is a data bug.
    #[error("cannot convert column `{column}` ({db_type}) to field `{field}`: {message}")]
    DataDrift {
        column: String,
        db_type: String,
        field: String,
        message: String,
    },

    /// A blocking call observed cancellation before it completed.
    #[error("operation on `{dataset}` cancelled during {stage}")]
    Cancelled { dataset: String, stage: &'static str },
}

impl EngineError {
    pub fn configuration(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    pub fn caller_contract(
        dataset: impl Into<String>,
        op_id: Option<Uuid>,
        message: impl Into<String>,
    ) -> Self {
        Self::CallerContract {
            dataset: dataset.into(),
            op_id,
            message: message.into(),
        }
    }

    pub fn store(
        dataset: impl Into<String>,
        op_id: Option<Uuid>,
        stage: &'static str,
        source: sqlx::Error,
    ) -> Self {
        Self::Store {
            dataset: dataset.into(),
            op_id,
            stage,
            source,
        }
    }

    pub fn cancelled(dataset: impl Into<String>, stage: &'static str) -> Self {
        Self::Cancelled {
            dataset: dataset.into(),
            stage,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
