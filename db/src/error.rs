//! Error types for schema loading and configuration.
//!
//! Provides a unified error type covering I/O, serialization, document shape,
//! and normalization failures.

use std::path::PathBuf;

use sqlreflect_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while loading schema definitions or configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Document parsed but is not a mapping of entity names to definitions.
    #[error("invalid schema document: {0}")]
    InvalidDocument(String),

    /// The same entity is declared by more than one source.
    #[error("entity '{0}' is declared more than once")]
    DuplicateEntity(String),

    /// File extension is not one of `json`, `yaml`, `yml`.
    #[error("unsupported schema file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// No sources were configured on a [`SchemaLoader`](crate::SchemaLoader).
    #[error("no schema sources configured")]
    NoSources,

    /// The loaded schema failed normalization.
    #[error("schema error: {0}")]
    SchemaError(#[from] SchemaError),
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
