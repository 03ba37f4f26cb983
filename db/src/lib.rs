//! Schema definition loading and store configuration.
//!
//! This crate sits between definition files and the live object factory:
//!
//! - [`RawSchema`] / [`SchemaLoader`] load nested entity definitions from
//!   JSON or YAML files and hand them to
//!   [`normalize`](sqlreflect_core::normalize).
//! - [`StoreConfig`] carries the connection-scoped settings (database path,
//!   journal mode, foreign-key enforcement, lifecycle atomicity).
//!
//! # Quick start
//!
//! ```no_run
//! use sqlreflect_db::{RawSchema, StoreConfig};
//!
//! let schema = RawSchema::from_file("schema.yaml").unwrap().normalize().unwrap();
//! let config = StoreConfig::load("store.yaml").unwrap_or_default();
//! println!("{} entities -> {}", schema.len(), config.location());
//! ```

mod config;
mod error;
mod loader;

pub use config::{DEFAULT_JOURNAL_MODE, StoreConfig};
pub use error::{LoadError, Result};
pub use loader::{RawSchema, SchemaLoader, SchemaSource};
