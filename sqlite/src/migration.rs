//! Table lifecycle operations for a normalized schema.
//!
//! [`Migration`] creates ([`up`](Migration::up)) and drops
//! ([`down`](Migration::down)) every table a schema describes and reports
//! per-table status. Creation and drops each run in a single transaction,
//! so either every statement applies or none does.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_db::StoreConfig;
//! use sqlreflect_sqlite::Factory;
//!
//! let factory = Factory::from_raw(&json!({"Game": {"name": "TEXT"}}), StoreConfig::in_memory()).unwrap();
//! assert!(!factory.status().unwrap().tables_exist());
//!
//! factory.create_tables().unwrap();
//! let status = factory.status().unwrap();
//! assert!(status.tables_exist());
//! assert_eq!(status.total_rows(), 0);
//! ```

use serde::Serialize;
use sqlreflect_core::Schema;
use tracing::debug;

use crate::error::Result;
use crate::schema::{generate_drop_sql, generate_entity_sql, generate_schema_sql, quote_ident, table_names};
use crate::storage::{SqlValue, Storage};

/// Runs DDL for a schema against a store.
pub(crate) struct Migration<'a> {
    storage: &'a Storage,
    schema: &'a Schema,
}

impl<'a> Migration<'a> {
    pub(crate) fn new(storage: &'a Storage, schema: &'a Schema) -> Self {
        Self { storage, schema }
    }

    /// Creates every table. Safe to call repeatedly.
    pub(crate) fn up(&self) -> Result<()> {
        let sql = generate_schema_sql(self.schema);
        if sql.is_empty() {
            return Ok(());
        }
        self.storage.transaction(&sql)
    }

    /// Creates the tables of one entity and its synthetic descendants.
    pub(crate) fn up_entity(&self, entity: &str) -> Result<()> {
        let sql = generate_entity_sql(self.schema, entity);
        if sql.is_empty() {
            return Ok(());
        }
        debug!(entity, "creating entity tables");
        self.storage.transaction(&sql)
    }

    /// Drops every table, association tables first. Safe to call when the
    /// tables do not exist.
    pub(crate) fn down(&self) -> Result<()> {
        let sql = generate_drop_sql(self.schema);
        if sql.is_empty() {
            return Ok(());
        }
        // Owned references point both ways; no drop order satisfies
        // immediate checks on the implicit DELETE.
        self.storage
            .transaction(&format!("PRAGMA defer_foreign_keys = ON;\n{sql}"))
    }

    /// Existence and row count of every table, in creation order.
    pub(crate) fn status(&self) -> Result<MigrationStatus> {
        let mut tables = Vec::new();
        for name in table_names(self.schema) {
            let exists = self.table_exists(&name)?;
            let rows = if exists { self.count_rows(&name)? } else { 0 };
            tables.push(TableStatus { name, exists, rows });
        }
        Ok(MigrationStatus { tables })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count = self.storage.query_ids(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[SqlValue::Text(name.to_string())],
        )?;
        Ok(count.first().copied().unwrap_or(0) > 0)
    }

    fn count_rows(&self, name: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
        let count = self.storage.query_ids(&sql, &[])?;
        Ok(count.first().copied().unwrap_or(0) as usize)
    }
}

/// Status of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
    /// Row count; zero when the table does not exist.
    pub rows: usize,
}

/// Snapshot of every table a schema describes.
///
/// Returned by [`Factory::status`](crate::Factory::status).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Object tables in schema order, then association tables.
    pub tables: Vec<TableStatus>,
}

impl MigrationStatus {
    /// `true` if the schema has tables and all of them exist.
    pub fn tables_exist(&self) -> bool {
        !self.tables.is_empty() && self.tables.iter().all(|t| t.exists)
    }

    pub fn table(&self, name: &str) -> Option<&TableStatus> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables the schema describes that are not in the database.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().filter(|t| !t.exists).map(|t| t.name.as_str())
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}
