//! Live object factory.
//!
//! A [`Factory`] owns the connection, the normalized schema, and one
//! identity map per entity type. [`EntityType`] is the per-entity surface
//! for construction and lookup.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_db::StoreConfig;
//! use sqlreflect_sqlite::Factory;
//!
//! let factory = Factory::from_raw(
//!     &json!({"Game": {"name": "TEXT"}, "Cred": {"username": "TEXT", "game": "@Game"}}),
//!     StoreConfig::in_memory(),
//! ).unwrap();
//! factory.create_tables().unwrap();
//!
//! let games = factory.entity("Game").unwrap();
//! let g = games.create(json!({"name": "g1"})).unwrap();
//! assert_eq!(g.idx(), 1);
//!
//! // Lookups return the same instance.
//! assert_eq!(games.get(1i64).unwrap(), Some(g));
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rusqlite::Connection;
use sqlreflect_core::{IDX_COLUMN, Schema, TableDescriptor};
use sqlreflect_db::StoreConfig;
use tracing::{debug, info, warn};

use crate::entity::{Entity, State, construct, hydrate};
use crate::error::{OrmError, Result};
use crate::identity::{Journal, Registry};
use crate::migration::{Migration, MigrationStatus};
use crate::query::Filter;
use crate::schema::quote_ident;
use crate::storage::{Row, SqlValue, Storage};
use crate::value::Input;

/// State shared by a factory and every handle it hands out.
pub(crate) struct Context {
    pub(crate) schema: Schema,
    pub(crate) storage: Storage,
    registry: RefCell<Registry>,
    journal: RefCell<Journal>,
    depth: Cell<usize>,
}

impl Context {
    fn new(schema: Schema, storage: Storage) -> Self {
        Self {
            schema,
            storage,
            registry: RefCell::new(Registry::default()),
            journal: RefCell::new(Journal::default()),
            depth: Cell::new(0),
        }
    }

    pub(crate) fn table(&self, entity: &str) -> Result<&TableDescriptor> {
        self.schema
            .get(entity)
            .ok_or_else(|| OrmError::UnknownEntity(entity.to_string()))
    }

    pub(crate) fn lookup(&self, entity: &str, idx: i64) -> Option<Entity> {
        self.registry.borrow().lookup(entity, idx)
    }

    pub(crate) fn register(&self, entity: &Entity) {
        self.registry.borrow_mut().register(entity.clone());
    }

    pub(crate) fn evict(&self, entity: &str, idx: i64) {
        self.registry.borrow_mut().evict(entity, idx);
    }

    fn is_cached(&self, entity: &str, idx: i64) -> bool {
        self.registry.borrow().contains(entity, idx)
    }

    fn cached_count(&self, entity: &str) -> usize {
        self.registry.borrow().len(entity)
    }

    pub(crate) fn record_created(&self, entity: &Entity) {
        if self.depth.get() > 0 {
            self.journal.borrow_mut().created.push(entity.clone());
        }
    }

    pub(crate) fn record_deleted(&self, entity: &Entity) {
        if self.depth.get() > 0 {
            self.journal.borrow_mut().deleted.push(entity.clone());
        }
    }

    pub(crate) fn record_touched(&self, entity: &Entity) {
        if self.depth.get() > 0 {
            self.journal.borrow_mut().touched.push(entity.clone());
        }
    }

    /// Runs `op` inside a savepoint when the store is configured atomic.
    ///
    /// On failure the savepoint is rolled back and the in-memory effects
    /// recorded since it opened are undone.
    pub(crate) fn atomically<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        if !self.storage.config().atomic {
            return op();
        }

        let depth = self.depth.get();
        let name = format!("sqlreflect_{depth}");
        self.storage.savepoint(&name)?;
        let mark = self.journal.borrow().mark();
        self.depth.set(depth + 1);
        let result = op();
        self.depth.set(depth);

        match result {
            Ok(value) => {
                self.storage.release(&name)?;
                if depth == 0 {
                    self.journal.borrow_mut().clear();
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.storage.rollback_to(&name) {
                    warn!(savepoint = %name, error = %rollback, "rollback failed");
                }
                let undo = self.journal.borrow_mut().split_off(mark);
                self.undo(undo);
                Err(err)
            }
        }
    }

    fn undo(&self, journal: Journal) {
        if journal.is_empty() {
            return;
        }
        debug!(
            created = journal.created.len(),
            deleted = journal.deleted.len(),
            "rolling back in-memory state"
        );

        for entity in &journal.deleted {
            if entity.state() == State::Deleted {
                entity.set_state(State::Live);
                self.register(entity);
            }
        }
        for entity in &journal.created {
            self.evict(entity.entity_name(), entity.idx());
            entity.set_state(State::Deleted);
        }

        let mut refreshed: Vec<&Entity> = Vec::new();
        for entity in journal.deleted.iter().chain(&journal.touched) {
            if entity.state() != State::Live || refreshed.contains(&entity) {
                continue;
            }
            refreshed.push(entity);
            let outcome = self
                .table(entity.entity_name())
                .and_then(|table| entity.refresh(self, table));
            if let Err(err) = outcome {
                warn!(entity = %entity.entity_name(), idx = entity.idx(), error = %err, "cannot refresh after rollback");
            }
        }
    }
}

/// Entry point: a connection, a schema, and the identity maps.
///
/// Cloning a factory is cheap and yields a handle to the same store and the
/// same identity maps. Factories are single-threaded.
#[derive(Clone)]
pub struct Factory {
    ctx: Rc<Context>,
}

impl Factory {
    /// Creates a factory; the connection opens on first use.
    pub fn new(schema: Schema, config: StoreConfig) -> Self {
        Self {
            ctx: Rc::new(Context::new(schema, Storage::new(config))),
        }
    }

    /// Creates a factory over a private in-memory database.
    pub fn in_memory(schema: Schema) -> Self {
        Self::new(schema, StoreConfig::in_memory())
    }

    /// Normalizes `raw` and creates a factory for it.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Schema`] if normalization fails.
    pub fn from_raw(raw: &serde_json::Value, config: StoreConfig) -> Result<Self> {
        let schema = sqlreflect_core::normalize(raw)?;
        Ok(Self::new(schema, config))
    }

    /// Creates a factory over an already-open connection.
    ///
    /// `config.path` is informational; journal mode and foreign keys are
    /// applied to `conn` immediately.
    pub fn with_connection(schema: Schema, conn: Connection, config: StoreConfig) -> Result<Self> {
        let storage = Storage::with_connection(conn, config)?;
        Ok(Self {
            ctx: Rc::new(Context::new(schema, storage)),
        })
    }

    pub(crate) fn from_context(ctx: Rc<Context>) -> Self {
        Self { ctx }
    }

    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    pub fn config(&self) -> &StoreConfig {
        self.ctx.storage.config()
    }

    /// Returns `true` once the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.ctx.storage.is_open()
    }

    /// Returns the constructor/lookup surface for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownEntity`] if the schema has no such entity.
    pub fn entity(&self, name: &str) -> Result<EntityType> {
        self.ctx.table(name)?;
        Ok(EntityType::new(Rc::clone(&self.ctx), name))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.ctx.schema.entity_names()
    }

    /// Creates every object and association table in one transaction.
    pub fn create_tables(&self) -> Result<()> {
        Migration::new(&self.ctx.storage, &self.ctx.schema).up()?;
        info!(tables = self.ctx.schema.len(), "created tables");
        Ok(())
    }

    /// Drops every table and invalidates all cached instances.
    pub fn drop_tables(&self) -> Result<()> {
        Migration::new(&self.ctx.storage, &self.ctx.schema).down()?;
        let instances = self.ctx.registry.borrow_mut().drain();
        for instance in &instances {
            instance.set_state(State::Deleted);
        }
        info!(invalidated = instances.len(), "dropped tables");
        Ok(())
    }

    /// Per-table existence and row counts.
    pub fn status(&self) -> Result<MigrationStatus> {
        Migration::new(&self.ctx.storage, &self.ctx.schema).status()
    }

    /// Runs a raw query, for diagnostics. Does not touch the identity maps.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.ctx.storage.query_all(sql, params)
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("location", &self.ctx.storage.config().location())
            .field("entities", &self.ctx.schema.len())
            .finish()
    }
}

/// Row selector for [`EntityType::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Id(i64),
    Where(Filter),
}

impl From<i64> for Lookup {
    fn from(idx: i64) -> Self {
        Lookup::Id(idx)
    }
}

impl From<Filter> for Lookup {
    fn from(filter: Filter) -> Self {
        Lookup::Where(filter)
    }
}

impl From<&Filter> for Lookup {
    fn from(filter: &Filter) -> Self {
        Lookup::Where(filter.clone())
    }
}

/// Construction and lookup for one entity type.
#[derive(Clone)]
pub struct EntityType {
    ctx: Rc<Context>,
    name: String,
}

impl EntityType {
    pub(crate) fn new(ctx: Rc<Context>, name: &str) -> Self {
        Self {
            ctx,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> Result<&TableDescriptor> {
        self.ctx.table(&self.name)
    }

    pub fn factory(&self) -> Factory {
        Factory::from_context(Rc::clone(&self.ctx))
    }

    /// Inserts a row from a record and returns its live instance.
    ///
    /// Keys that are not fields of the entity are ignored. Record values on
    /// reference fields and array positions construct new target instances;
    /// owned targets are linked back to the new row.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Construction`] if `fields` is not a record or a
    /// value has the wrong shape or entity type, and
    /// [`OrmError::ReadOnlyField`] if `idx` is supplied.
    pub fn create(&self, fields: impl Into<Input>) -> Result<Entity> {
        match fields.into() {
            Input::Record(fields) => construct(&self.ctx, &self.name, fields),
            other => Err(OrmError::Construction {
                entity: self.name.clone(),
                reason: format!("expected a record, found {}", other.describe()),
            }),
        }
    }

    /// Inserts a row with every column at its default.
    pub fn create_default(&self) -> Result<Entity> {
        construct(&self.ctx, &self.name, Vec::new())
    }

    /// Looks up one instance by id or by the first row matching a filter.
    ///
    /// Returns the cached instance when the row is already live.
    pub fn get(&self, lookup: impl Into<Lookup>) -> Result<Option<Entity>> {
        let table = self.descriptor()?;
        match lookup.into() {
            Lookup::Id(idx) => hydrate(&self.ctx, table, idx),
            Lookup::Where(filter) => {
                for idx in self.ids(Some(&filter))? {
                    if let Some(entity) = hydrate(&self.ctx, table, idx)? {
                        return Ok(Some(entity));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Every matching instance, ordered by `idx`.
    pub fn all(&self, filter: Option<&Filter>) -> Result<Vec<Entity>> {
        let table = self.descriptor()?;
        let mut out = Vec::new();
        for idx in self.ids(filter)? {
            if let Some(entity) = hydrate(&self.ctx, table, idx)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Matching row ids, ordered, without hydrating instances.
    pub fn ids(&self, filter: Option<&Filter>) -> Result<Vec<i64>> {
        let table = self.descriptor()?;
        let (clause, params) = match filter {
            Some(filter) => filter.to_sql(table)?,
            None => (String::new(), Vec::new()),
        };
        let sql = format!(
            "SELECT {idx} FROM {table}{clause} ORDER BY {idx}",
            idx = quote_ident(IDX_COLUMN),
            table = quote_ident(&table.table),
        );
        self.ctx.storage.query_ids(&sql, &params)
    }

    /// Creates this entity's tables, its synthetic descendants' tables, and
    /// their association tables.
    pub fn create_tables(&self) -> Result<()> {
        Migration::new(&self.ctx.storage, &self.ctx.schema).up_entity(&self.name)
    }

    /// Returns `true` if the row currently has a live instance.
    pub fn is_cached(&self, idx: i64) -> bool {
        self.ctx.is_cached(&self.name, idx)
    }

    /// Number of live instances of this entity.
    pub fn cached_count(&self) -> usize {
        self.ctx.cached_count(&self.name)
    }
}

impl std::fmt::Debug for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityType").field("name", &self.name).finish()
    }
}
