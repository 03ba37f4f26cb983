//! Schema descriptors and nested-schema normalization.
//!
//! This crate defines the data model shared by the rest of the workspace:
//!
//! - [`Schema`]: flat, ordered collection of entity descriptors.
//! - [`TableDescriptor`]: one entity and its object table.
//! - [`FieldDescriptor`] / [`FieldKind`]: primitive columns, references,
//!   and arrays, each with an explicit [`Ownership`].
//!
//! [`normalize`] turns a raw nested schema document into a [`Schema`],
//! promoting embedded structures to synthetic entities and reporting
//! malformed input as [`SchemaError`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_core::normalize;
//!
//! let schema = normalize(&json!({
//!     "Game": { "name": "TEXT" },
//!     "Cred": { "username": "TEXT", "game": "@Game", "friends": ["@Cred"] }
//! }))
//! .unwrap();
//!
//! assert_eq!(schema.len(), 2);
//! assert!(schema.get("Cred").unwrap().field("friends").unwrap().is_array());
//! ```

mod normalize;
mod types;
mod validate;

pub use normalize::normalize;
pub use types::*;
pub use validate::{Result, SchemaError, validate_identifier};
