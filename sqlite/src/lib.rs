//! Live objects over SQLite for normalized schemas.
//!
//! This crate turns a normalized [`Schema`](sqlreflect_core::Schema) into
//! tables and hands out live instances whose field writes go straight to
//! the database. Each stored row has at most one live [`Entity`] per
//! [`Factory`], so every handle observes every write.
//!
//! # Architecture
//!
//! - **`schema`**: DDL generation for object and association tables
//! - **`migration`**: table lifecycle (up/down/status)
//! - **`storage`**: the lazily opened connection and statement helpers
//! - **`factory`**: the factory, per-entity constructors, and savepoints
//! - **`entity`**: field reads, writes, deletion, and ownership release
//! - **`array`**: the association proxy for array fields
//! - **`query`**: exact-match filters
//! - **`global`**: an optional per-thread default factory
//!
//! # Quick start
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_db::StoreConfig;
//! use sqlreflect_sqlite::{Factory, Filter};
//!
//! let factory = Factory::from_raw(
//!     &json!({
//!         "Game": {"name": "TEXT"},
//!         "Cred": {"username": "TEXT", "game": "@Game", "friends": "[]@Cred"}
//!     }),
//!     StoreConfig::in_memory(),
//! ).unwrap();
//! factory.create_tables().unwrap();
//!
//! let games = factory.entity("Game").unwrap();
//! let creds = factory.entity("Cred").unwrap();
//!
//! let g = games.create(json!({"name": "g1"})).unwrap();
//! let bill = creds.create(json!({"username": "bill"})).unwrap();
//! bill.set("game", &g).unwrap();
//!
//! let found = creds.get(Filter::new().eq("username", "bill")).unwrap().unwrap();
//! assert_eq!(found, bill);
//! assert_eq!(found.get_entity("game").unwrap(), Some(g));
//! ```
//!
//! # On-disk stores
//!
//! ```no_run
//! use sqlreflect_db::{SchemaLoader, StoreConfig};
//! use sqlreflect_sqlite::Factory;
//!
//! let schema = SchemaLoader::new().file("schema.yaml").build().unwrap().normalize().unwrap();
//! let factory = Factory::new(schema, StoreConfig::at("app.db"));
//! factory.create_tables().unwrap();
//! println!("{:?}", factory.status().unwrap());
//! ```

mod array;
mod convert;
mod entity;
mod error;
mod factory;
pub mod global;
mod identity;
mod migration;
mod query;
mod schema;
mod storage;
mod value;

pub use array::ArrayField;
pub use entity::{Entity, State};
pub use error::{OrmError, Result};
pub use factory::{EntityType, Factory, Lookup};
pub use migration::{MigrationStatus, TableStatus};
pub use query::Filter;
pub use schema::{
    create_association_sql, create_table_sql, generate_drop_sql, generate_entity_sql, generate_schema_sql,
    quote_ident, table_names,
};
pub use storage::{Row, SqlValue};
pub use value::{Input, Value};
