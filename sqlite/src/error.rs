//! Error types for live-object operations.
//!
//! Provides a unified error type covering normalization, storage access,
//! field access, and lifecycle failures.

use sqlreflect_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while reading, writing, or managing live objects.
#[derive(Debug, Error)]
pub enum OrmError {
    /// The raw schema failed normalization.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A statement failed inside SQLite.
    #[error("storage error in `{statement}`: {source}")]
    Storage {
        /// The SQL text that failed.
        statement: String,
        /// Underlying driver error.
        source: rusqlite::Error,
    },

    /// The database could not be opened or configured.
    #[error("cannot open database {path}: {source}")]
    Open {
        /// Database location as configured.
        path: String,
        /// Underlying driver error.
        source: rusqlite::Error,
    },

    /// `journal_mode` is not one SQLite accepts.
    #[error("unsupported journal mode '{0}'")]
    InvalidJournalMode(String),

    /// Write to `idx` (or to `ridx` of an owned entity).
    #[error("field '{field}' of {entity} is read-only")]
    ReadOnlyField { entity: String, field: String },

    /// A value of the wrong kind or entity type was written to a field.
    #[error("type mismatch for {entity}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: String,
        found: String,
    },

    /// A primitive, null, or list was stored into an array position.
    #[error("invalid element for array {entity}.{field}: {found}")]
    InvalidArrayElement {
        entity: String,
        field: String,
        found: String,
    },

    /// No entity with this name exists in the schema.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// The entity has no field (or filterable column) with this name.
    #[error("unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    /// Construction input was rejected before anything was written.
    #[error("cannot construct {entity}: {reason}")]
    Construction { entity: String, reason: String },

    /// The instance has been deleted.
    #[error("{entity} #{idx} has been deleted")]
    StaleInstance { entity: String, idx: i64 },

    /// The factory that produced this handle has been dropped.
    #[error("the factory owning this instance has been dropped")]
    FactoryClosed,

    /// [`global::current`](crate::global::current) was called before
    /// [`global::install`](crate::global::install).
    #[error("no factory installed on this thread")]
    NoFactory,
}

/// Convenience alias for results with [`OrmError`].
pub type Result<T> = std::result::Result<T, OrmError>;

pub(crate) fn storage_error(statement: &str, source: rusqlite::Error) -> OrmError {
    OrmError::Storage {
        statement: statement.to_string(),
        source,
    }
}
