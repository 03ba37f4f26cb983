//! Live instances and their field semantics.
//!
//! An [`Entity`] is a handle to the single in-memory instance of one stored
//! row. Reads come from hydrated slots; writes go to the database first and
//! then update the slots, so every write is immediately visible through
//! every handle and to fresh queries.
//!
//! Reference and array slots hold row ids, not handles. Reading one resolves
//! the id through the identity map, so cyclic object graphs never form
//! reference-count cycles.
//!
//! # Ownership
//!
//! Embedded structures are owned: their rows carry a `ridx` back-reference
//! to the owner row. When an owner lets go of an owned instance (overwrite,
//! clear, array removal, or owner deletion) the instance is *released*: it is
//! deleted if no other owner column or association row still refers to it,
//! otherwise its `ridx` is moved to a remaining owner so the storage cascade
//! cannot remove it.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use sqlreflect_core::{
    FieldDescriptor, FieldKind, IDX_COLUMN, OWNER_COLUMN, Ownership, POSITION_COLUMN,
    REFERENCED_COLUMN, RIDX_COLUMN, TableDescriptor,
};
use tracing::debug;

use crate::array::ArrayField;
use crate::convert::{input_to_sql, sql_to_id, sql_to_json, sql_to_value};
use crate::error::{OrmError, Result};
use crate::factory::{Context, Factory};
use crate::schema::quote_ident;
use crate::storage::{Row, SqlValue};
use crate::value::{Input, Value};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Registered but still being hydrated.
    Constructing,
    Live,
    /// Deleted, or discarded by a rollback. Field access fails.
    Deleted,
}

/// Cached field data.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Primitive(SqlValue),
    Reference(Option<i64>),
    Array(BTreeMap<usize, i64>),
}

struct EntityCell {
    ctx: Weak<Context>,
    entity: String,
    idx: i64,
    state: Cell<State>,
    slots: RefCell<HashMap<String, Slot>>,
}

/// Handle to a live instance.
///
/// Handles are cheap to clone; clones refer to the same instance and compare
/// equal. Two handles for the same row obtained from the same factory are
/// always the same instance.
#[derive(Clone)]
pub struct Entity(Rc<EntityCell>);

impl Entity {
    pub(crate) fn new(ctx: Weak<Context>, entity: &str, idx: i64) -> Self {
        Entity(Rc::new(EntityCell {
            ctx,
            entity: entity.to_string(),
            idx,
            state: Cell::new(State::Constructing),
            slots: RefCell::new(HashMap::new()),
        }))
    }

    /// Row id; assigned by the store and never changed.
    pub fn idx(&self) -> i64 {
        self.0.idx
    }

    pub fn entity_name(&self) -> &str {
        &self.0.entity
    }

    pub fn state(&self) -> State {
        self.0.state.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == State::Deleted
    }

    pub(crate) fn set_state(&self, state: State) {
        self.0.state.set(state);
    }

    /// The factory this instance belongs to.
    pub fn factory(&self) -> Result<Factory> {
        self.context().map(Factory::from_context)
    }

    /// Reads a field.
    ///
    /// `idx` yields an integer, primitives their cached value, references
    /// the referenced instance (or `Null`), and arrays an [`ArrayField`].
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownField`] for names that are not fields, and
    /// [`OrmError::StaleInstance`] once the instance is deleted.
    pub fn get(&self, field: &str) -> Result<Value> {
        self.ensure_live()?;
        if field == IDX_COLUMN {
            return Ok(Value::Integer(self.idx()));
        }
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;
        let descriptor = self.field(table, field)?;

        match &descriptor.kind {
            FieldKind::Primitive { .. } => Ok(self
                .primitive(field)
                .map_or(Value::Null, |value| sql_to_value(&value))),
            FieldKind::Reference { target, .. } => {
                let Some(id) = self.reference_id(field) else {
                    return Ok(Value::Null);
                };
                let found = hydrate(&ctx, ctx.table(target)?, id)?;
                Ok(found.map_or(Value::Null, Value::Entity))
            }
            FieldKind::Array { .. } => Ok(Value::Array(ArrayField::new(self.clone(), field))),
        }
    }

    /// Reads a reference field.
    pub fn get_entity(&self, field: &str) -> Result<Option<Entity>> {
        match self.get(field)? {
            Value::Entity(entity) => Ok(Some(entity)),
            Value::Null => Ok(None),
            other => Err(self.mismatch(field, "a reference field", value_kind(&other))),
        }
    }

    /// Returns the association proxy of an array field.
    pub fn array(&self, field: &str) -> Result<ArrayField> {
        match self.get(field)? {
            Value::Array(array) => Ok(array),
            other => Err(self.mismatch(field, "an array field", value_kind(&other))),
        }
    }

    /// Writes a field.
    ///
    /// - primitives accept scalar inputs;
    /// - references accept a live instance of the target entity, a record
    ///   (constructing a new target instance), or null (clearing);
    /// - arrays accept a list, replacing every position, or null.
    ///
    /// Overwriting an owned reference releases the previous instance.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ReadOnlyField`] for `idx` (and `ridx` of owned
    /// entities) and [`OrmError::TypeMismatch`] for values of the wrong
    /// kind or entity type.
    pub fn set(&self, field: &str, value: impl Into<Input>) -> Result<()> {
        self.ensure_live()?;
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;
        if table.is_read_only(field) {
            return Err(self.read_only(field));
        }
        let descriptor = self.field(table, field)?;
        let value = value.into();

        match &descriptor.kind {
            FieldKind::Primitive { .. } => match input_to_sql(&value) {
                Some(sql) => self.write_column(&ctx, table, field, sql),
                None => Err(self.mismatch(field, "a primitive value", &value.describe())),
            },
            FieldKind::Reference {
                target, ownership, ..
            } => match value {
                Input::Null => self.assign_reference(&ctx, table, descriptor, None),
                Input::Entity(other) => {
                    if other.entity_name() != target {
                        return Err(self.mismatch(field, target, &format!("{} entity", other.entity_name())));
                    }
                    other.ensure_live()?;
                    self.assign_reference(&ctx, table, descriptor, Some(other.idx()))
                }
                Input::Record(fields) => ctx.atomically(|| {
                    let created = construct_for(&ctx, target, *ownership, fields, self.idx())?;
                    self.assign_reference(&ctx, table, descriptor, Some(created.idx()))
                }),
                other => Err(self.mismatch(
                    field,
                    &format!("a {target} entity or record"),
                    &other.describe(),
                )),
            },
            FieldKind::Array { .. } => match value {
                Input::List(items) => ArrayField::new(self.clone(), field).replace(items),
                Input::Null => ArrayField::new(self.clone(), field).clear(),
                other => Err(self.mismatch(field, "a list", &other.describe())),
            },
        }
    }

    /// Clears a field: primitives become NULL, references are unset
    /// (releasing owned instances), and arrays lose every position.
    pub fn clear(&self, field: &str) -> Result<()> {
        self.ensure_live()?;
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;
        if table.is_read_only(field) {
            return Err(self.read_only(field));
        }
        let descriptor = self.field(table, field)?;

        match &descriptor.kind {
            FieldKind::Primitive { .. } => self.write_column(&ctx, table, field, SqlValue::Null),
            FieldKind::Reference { .. } => self.assign_reference(&ctx, table, descriptor, None),
            FieldKind::Array { .. } => ArrayField::new(self.clone(), field).clear(),
        }
    }

    /// Deletes the instance and everything it exclusively owns.
    ///
    /// Association rows of every array field are removed, owned references
    /// are released, remaining owned children are deleted, then the row
    /// itself. The instance leaves the identity map and further field access
    /// fails with [`OrmError::StaleInstance`]. Deleting twice is a no-op.
    pub fn delete(&self) -> Result<()> {
        if self.is_deleted() {
            return Ok(());
        }
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;

        ctx.atomically(|| {
            for field in table.arrays() {
                ArrayField::new(self.clone(), &field.name).clear()?;
            }
            for field in table.columns().filter(|f| f.is_reference() && f.is_owned()) {
                self.assign_reference(&ctx, table, field, None)?;
            }

            let idx = SqlValue::Integer(self.idx());
            for child in ctx.schema.children_of(&table.entity) {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    quote_ident(IDX_COLUMN),
                    quote_ident(&child.table),
                    quote_ident(RIDX_COLUMN)
                );
                for id in ctx.storage.query_ids(&sql, std::slice::from_ref(&idx))? {
                    if let Some(orphan) = hydrate(&ctx, child, id)? {
                        orphan.delete()?;
                    }
                }
            }

            let sql = format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(&table.table),
                quote_ident(IDX_COLUMN)
            );
            ctx.storage.execute(&sql, &[idx])?;
            ctx.evict(self.entity_name(), self.idx());
            self.set_state(State::Deleted);
            ctx.record_deleted(self);
            debug!(entity = %self.entity_name(), idx = self.idx(), "deleted");
            Ok(())
        })
    }

    /// Re-reads the row into this instance, keeping its identity.
    ///
    /// Returns `false` (and marks the instance deleted) if the row no longer
    /// exists.
    pub fn reload(&self) -> Result<bool> {
        if self.is_deleted() {
            return Ok(false);
        }
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;
        if self.refresh(&ctx, table)? {
            let mut pending = VecDeque::new();
            self.queue_references(table, &mut pending);
            hydrate_queued(&ctx, pending)?;
            return Ok(true);
        }
        ctx.evict(self.entity_name(), self.idx());
        self.set_state(State::Deleted);
        Ok(false)
    }

    /// Snapshot of the cached fields: references as ids, arrays as id lists
    /// with `null` holes.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.ensure_live()?;
        let ctx = self.context()?;
        let table = ctx.table(self.entity_name())?;
        let slots = self.0.slots.borrow();

        let mut out = serde_json::Map::new();
        out.insert(IDX_COLUMN.to_string(), self.idx().into());
        for field in &table.fields {
            let json = match slots.get(&field.name) {
                Some(Slot::Primitive(value)) => sql_to_json(value),
                Some(Slot::Reference(id)) => id.map_or(serde_json::Value::Null, Into::into),
                Some(Slot::Array(positions)) => {
                    let len = positions.keys().next_back().map_or(0, |p| p + 1);
                    (0..len)
                        .map(|p| positions.get(&p).map_or(serde_json::Value::Null, |id| (*id).into()))
                        .collect()
                }
                None => serde_json::Value::Null,
            };
            out.insert(field.name.clone(), json);
        }
        Ok(serde_json::Value::Object(out))
    }

    // ---------------------------------------------------------------------
    // Internals shared with the array proxy and the factory
    // ---------------------------------------------------------------------

    pub(crate) fn context(&self) -> Result<Rc<Context>> {
        self.0.ctx.upgrade().ok_or(OrmError::FactoryClosed)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(OrmError::StaleInstance {
                entity: self.entity_name().to_string(),
                idx: self.idx(),
            });
        }
        Ok(())
    }

    fn field<'t>(&self, table: &'t TableDescriptor, field: &str) -> Result<&'t FieldDescriptor> {
        table.field(field).ok_or_else(|| OrmError::UnknownField {
            entity: self.entity_name().to_string(),
            field: field.to_string(),
        })
    }

    fn read_only(&self, field: &str) -> OrmError {
        OrmError::ReadOnlyField {
            entity: self.entity_name().to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn mismatch(&self, field: &str, expected: &str, found: &str) -> OrmError {
        OrmError::TypeMismatch {
            entity: self.entity_name().to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    fn primitive(&self, field: &str) -> Option<SqlValue> {
        match self.0.slots.borrow().get(field) {
            Some(Slot::Primitive(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) fn reference_id(&self, field: &str) -> Option<i64> {
        match self.0.slots.borrow().get(field) {
            Some(Slot::Reference(id)) => *id,
            _ => None,
        }
    }

    pub(crate) fn positions(&self, field: &str) -> BTreeMap<usize, i64> {
        match self.0.slots.borrow().get(field) {
            Some(Slot::Array(positions)) => positions.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub(crate) fn update_positions<R>(&self, field: &str, f: impl FnOnce(&mut BTreeMap<usize, i64>) -> R) -> R {
        let mut slots = self.0.slots.borrow_mut();
        let slot = slots
            .entry(field.to_string())
            .or_insert_with(|| Slot::Array(BTreeMap::new()));
        if let Slot::Array(positions) = slot {
            return f(positions);
        }
        let mut positions = BTreeMap::new();
        let result = f(&mut positions);
        *slot = Slot::Array(positions);
        result
    }

    fn set_slot(&self, field: &str, slot: Slot) {
        self.0.slots.borrow_mut().insert(field.to_string(), slot);
    }

    fn write_column(&self, ctx: &Context, table: &TableDescriptor, field: &str, value: SqlValue) -> Result<()> {
        if self.primitive(field).as_ref() == Some(&value) {
            return Ok(());
        }
        update_column(ctx, table, self.idx(), field, value)?;
        // Column affinity may have converted the value; cache what was stored.
        let stored = select_column(ctx, table, self.idx(), field)?;
        self.set_slot(field, Slot::Primitive(stored));
        ctx.record_touched(self);
        Ok(())
    }

    fn assign_reference(
        &self,
        ctx: &Rc<Context>,
        table: &TableDescriptor,
        descriptor: &FieldDescriptor,
        new: Option<i64>,
    ) -> Result<()> {
        let previous = self.reference_id(&descriptor.name);
        if previous == new {
            return Ok(());
        }

        ctx.atomically(|| {
            let value = new.map_or(SqlValue::Null, SqlValue::Integer);
            update_column(ctx, table, self.idx(), &descriptor.name, value)?;
            self.set_slot(&descriptor.name, Slot::Reference(new));
            ctx.record_touched(self);

            if let (Some(previous), FieldKind::Reference { target, ownership: Ownership::Owned, .. }) =
                (previous, &descriptor.kind)
            {
                release(ctx, target, previous)?;
            }
            Ok(())
        })
    }

    /// Fills the slots from a row plus the association tables. Does not
    /// hydrate referenced instances.
    fn load(&self, ctx: &Context, table: &TableDescriptor, row: &Row) -> Result<()> {
        let mut slots = HashMap::with_capacity(table.fields.len());
        for field in &table.fields {
            let slot = match &field.kind {
                FieldKind::Primitive { .. } => {
                    Slot::Primitive(row.get(&field.name).cloned().unwrap_or(SqlValue::Null))
                }
                FieldKind::Reference { .. } => Slot::Reference(row.get(&field.name).and_then(sql_to_id)),
                FieldKind::Array { table: association, .. } => {
                    Slot::Array(load_positions(ctx, association, self.idx())?)
                }
            };
            slots.insert(field.name.clone(), slot);
        }
        *self.0.slots.borrow_mut() = slots;
        Ok(())
    }

    /// Re-reads the row into the slots; `false` if the row is gone.
    pub(crate) fn refresh(&self, ctx: &Context, table: &TableDescriptor) -> Result<bool> {
        match select_row(ctx, table, self.idx())? {
            Some(row) => {
                self.load(ctx, table, &row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queues every referenced row and array element for hydration.
    fn queue_references(&self, table: &TableDescriptor, pending: &mut VecDeque<(String, i64)>) {
        for field in &table.fields {
            match &field.kind {
                FieldKind::Primitive { .. } => {}
                FieldKind::Reference { target, .. } => {
                    if let Some(id) = self.reference_id(&field.name) {
                        pending.push_back((target.clone(), id));
                    }
                }
                FieldKind::Array { target, .. } => {
                    pending.extend(
                        self.positions(&field.name)
                            .into_values()
                            .map(|id| (target.clone(), id)),
                    );
                }
            }
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.entity.hash(state);
        self.0.idx.hash(state);
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("entity", &self.0.entity)
            .field("idx", &self.0.idx)
            .field("state", &self.0.state.get())
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
        Value::Entity(_) => "entity",
        Value::Array(_) => "array",
    }
}

// -------------------------------------------------------------------------
// Lifecycle operations
// -------------------------------------------------------------------------

/// Returns the canonical instance for a row, hydrating it if needed.
///
/// Everything reachable from the row is hydrated with it. Returns `None`
/// if the row does not exist.
pub(crate) fn hydrate(ctx: &Rc<Context>, table: &TableDescriptor, idx: i64) -> Result<Option<Entity>> {
    if let Some(entity) = ctx.lookup(&table.entity, idx) {
        return Ok(Some(entity));
    }
    hydrate_queued(ctx, VecDeque::from([(table.entity.clone(), idx)]))?;
    Ok(ctx.lookup(&table.entity, idx))
}

/// Hydrates the queued rows and every row reachable from them, breadth
/// first.
///
/// Each instance is registered before its row is loaded, so cycles and
/// shared targets resolve to the instance already in the map. Rows that no
/// longer exist are skipped. On failure every instance placed by this call
/// is evicted again.
fn hydrate_queued(ctx: &Rc<Context>, mut pending: VecDeque<(String, i64)>) -> Result<()> {
    let mut placed = Vec::new();
    let loaded = drain_queue(ctx, &mut pending, &mut placed);

    for entity in &placed {
        if loaded.is_ok() {
            entity.set_state(State::Live);
        } else {
            ctx.evict(entity.entity_name(), entity.idx());
            entity.set_state(State::Deleted);
        }
    }
    loaded
}

fn drain_queue(ctx: &Rc<Context>, pending: &mut VecDeque<(String, i64)>, placed: &mut Vec<Entity>) -> Result<()> {
    while let Some((target, idx)) = pending.pop_front() {
        if ctx.lookup(&target, idx).is_some() {
            continue;
        }
        let table = ctx.table(&target)?;
        let Some(row) = select_row(ctx, table, idx)? else {
            continue;
        };

        let entity = Entity::new(Rc::downgrade(ctx), &table.entity, idx);
        ctx.register(&entity);
        placed.push(entity.clone());
        entity.load(ctx, table, &row)?;
        entity.queue_references(table, pending);
    }
    Ok(())
}

/// Inserts a row for `entity` from record fields and returns its instance.
pub(crate) fn construct(ctx: &Rc<Context>, entity: &str, fields: Vec<(String, Input)>) -> Result<Entity> {
    let table = ctx.table(entity)?;

    let mut columns: Vec<(&FieldDescriptor, Input)> = Vec::new();
    let mut deferred: Vec<(&FieldDescriptor, Input)> = Vec::new();
    for (name, value) in fields {
        if name == IDX_COLUMN {
            return Err(OrmError::ReadOnlyField {
                entity: entity.to_string(),
                field: name,
            });
        }
        let Some(field) = table.field(&name) else {
            debug!(entity, field = %name, "ignoring unknown field");
            continue;
        };
        check_construction_value(table, field, &value)?;

        columns.retain(|(f, _)| f.name != name);
        deferred.retain(|(f, _)| f.name != name);
        match &field.kind {
            FieldKind::Primitive { .. } => columns.push((field, value)),
            FieldKind::Reference { ownership, .. } if !ownership.is_owned() => columns.push((field, value)),
            FieldKind::Reference { .. } | FieldKind::Array { .. } => deferred.push((field, value)),
        }
    }

    ctx.atomically(|| {
        let mut names = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len());
        for (field, value) in columns {
            let param = match (&field.kind, value) {
                (FieldKind::Reference { target, .. }, Input::Record(record)) => {
                    SqlValue::Integer(construct(ctx, target, record)?.idx())
                }
                (_, Input::Entity(other)) => SqlValue::Integer(other.idx()),
                (_, value) => input_to_sql(&value).unwrap_or(SqlValue::Null),
            };
            names.push(quote_ident(&field.name));
            params.push(param);
        }

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&table.table))
        } else {
            let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table.table),
                names.join(", "),
                placeholders.join(", ")
            )
        };
        let idx = ctx.storage.insert(&sql, &params)?;

        let instance = hydrate(ctx, table, idx)?.ok_or_else(|| OrmError::Construction {
            entity: entity.to_string(),
            reason: format!("row {idx} vanished after insert"),
        })?;
        ctx.record_created(&instance);

        for (field, value) in deferred {
            instance.set(&field.name, value)?;
        }
        debug!(entity, idx, "created");
        Ok(instance)
    })
}

/// Constructs a target instance for a reference or array position; owned
/// targets are linked to `owner_idx` through `ridx`.
pub(crate) fn construct_for(
    ctx: &Rc<Context>,
    target: &str,
    ownership: Ownership,
    mut fields: Vec<(String, Input)>,
    owner_idx: i64,
) -> Result<Entity> {
    if ownership.is_owned() {
        fields.retain(|(name, _)| name != RIDX_COLUMN);
        fields.push((RIDX_COLUMN.to_string(), Input::Integer(owner_idx)));
    }
    construct(ctx, target, fields)
}

/// Lets go of an owned instance: deletes it if nothing else owns it,
/// otherwise re-homes its `ridx` to a remaining owner.
pub(crate) fn release(ctx: &Rc<Context>, target: &str, id: i64) -> Result<()> {
    let table = ctx.table(target)?;
    let owners = remaining_owners(ctx, target, id)?;

    if owners.is_empty() {
        if let Some(orphan) = hydrate(ctx, table, id)? {
            debug!(entity = target, idx = id, "releasing orphaned instance");
            orphan.delete()?;
        }
        return Ok(());
    }

    let Some(parent) = table.nested.as_ref().map(|n| n.parent.as_str()) else {
        return Ok(());
    };
    let candidates: Vec<i64> = owners
        .iter()
        .filter(|(entity, _)| entity == parent)
        .map(|(_, idx)| *idx)
        .collect();
    let Some(&new_owner) = candidates.first() else {
        return Ok(());
    };

    let current = select_row(ctx, table, id)?.and_then(|row| row.integer(RIDX_COLUMN));
    if current.is_some_and(|ridx| candidates.contains(&ridx)) {
        return Ok(());
    }

    update_column(ctx, table, id, RIDX_COLUMN, SqlValue::Integer(new_owner))?;
    if let Some(instance) = ctx.lookup(target, id) {
        instance.set_slot(RIDX_COLUMN, Slot::Primitive(SqlValue::Integer(new_owner)));
        ctx.record_touched(&instance);
    }
    debug!(entity = target, idx = id, owner = new_owner, "re-homed owned instance");
    Ok(())
}

/// Every `(entity, idx)` whose owned column or owned array still refers to
/// row `id` of `target`.
fn remaining_owners(ctx: &Context, target: &str, id: i64) -> Result<Vec<(String, i64)>> {
    let param = [SqlValue::Integer(id)];
    let mut owners = Vec::new();

    for table in ctx.schema.tables() {
        for field in &table.fields {
            let sql = match &field.kind {
                FieldKind::Reference { target: t, ownership: Ownership::Owned, .. } if t == target => format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    quote_ident(IDX_COLUMN),
                    quote_ident(&table.table),
                    quote_ident(&field.name)
                ),
                FieldKind::Array { target: t, table: association, ownership: Ownership::Owned } if t == target => {
                    format!(
                        "SELECT DISTINCT {} FROM {} WHERE {} = ?1",
                        quote_ident(OWNER_COLUMN),
                        quote_ident(association),
                        quote_ident(REFERENCED_COLUMN)
                    )
                }
                _ => continue,
            };
            for owner in ctx.storage.query_ids(&sql, &param)? {
                owners.push((table.entity.clone(), owner));
            }
        }
    }
    Ok(owners)
}

fn check_construction_value(table: &TableDescriptor, field: &FieldDescriptor, value: &Input) -> Result<()> {
    let reject = |reason: String| {
        Err(OrmError::Construction {
            entity: table.entity.clone(),
            reason,
        })
    };
    let check_entity = |target: &str, other: &Entity| {
        if other.entity_name() != target {
            return reject(format!(
                "field '{}' expects {target}, found {} entity",
                field.name,
                other.entity_name()
            ));
        }
        if other.is_deleted() {
            return reject(format!("field '{}' refers to a deleted {target}", field.name));
        }
        Ok(())
    };

    match (&field.kind, value) {
        (FieldKind::Primitive { .. }, value) if value.is_scalar() => Ok(()),
        (FieldKind::Primitive { .. }, value) => reject(format!(
            "field '{}' expects a primitive value, found {}",
            field.name,
            value.describe()
        )),
        (FieldKind::Reference { .. }, Input::Null | Input::Record(_)) => Ok(()),
        (FieldKind::Reference { target, .. }, Input::Entity(other)) => check_entity(target, other),
        (FieldKind::Reference { target, .. }, value) => reject(format!(
            "field '{}' expects a {target} entity or record, found {}",
            field.name,
            value.describe()
        )),
        (FieldKind::Array { .. }, Input::Null) => Ok(()),
        (FieldKind::Array { target, .. }, Input::List(items)) => {
            for item in items.iter().flatten() {
                match item {
                    Input::Record(_) => {}
                    Input::Entity(other) => check_entity(target, other)?,
                    other => {
                        return reject(format!(
                            "array '{}' cannot hold {}",
                            field.name,
                            other.describe()
                        ));
                    }
                }
            }
            Ok(())
        }
        (FieldKind::Array { .. }, value) => reject(format!(
            "field '{}' expects a list, found {}",
            field.name,
            value.describe()
        )),
    }
}

fn select_row(ctx: &Context, table: &TableDescriptor, idx: i64) -> Result<Option<Row>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?1",
        quote_ident(&table.table),
        quote_ident(IDX_COLUMN)
    );
    ctx.storage.query_row(&sql, &[SqlValue::Integer(idx)])
}

fn select_column(ctx: &Context, table: &TableDescriptor, idx: i64, column: &str) -> Result<SqlValue> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        quote_ident(column),
        quote_ident(&table.table),
        quote_ident(IDX_COLUMN)
    );
    let row = ctx.storage.query_row(&sql, &[SqlValue::Integer(idx)])?;
    Ok(row.and_then(|row| row.get(column).cloned()).unwrap_or(SqlValue::Null))
}

fn update_column(ctx: &Context, table: &TableDescriptor, idx: i64, column: &str, value: SqlValue) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        quote_ident(&table.table),
        quote_ident(column),
        quote_ident(IDX_COLUMN)
    );
    ctx.storage.execute(&sql, &[value, SqlValue::Integer(idx)])?;
    Ok(())
}

fn load_positions(ctx: &Context, association: &str, owner: i64) -> Result<BTreeMap<usize, i64>> {
    let sql = format!(
        "SELECT {position}, {referenced} FROM {table} WHERE {owner} = ?1 ORDER BY {position}",
        position = quote_ident(POSITION_COLUMN),
        referenced = quote_ident(REFERENCED_COLUMN),
        table = quote_ident(association),
        owner = quote_ident(OWNER_COLUMN),
    );
    let mut positions = BTreeMap::new();
    for row in ctx.storage.query_all(&sql, &[SqlValue::Integer(owner)])? {
        let position = row.integer(POSITION_COLUMN).and_then(|p| usize::try_from(p).ok());
        if let (Some(position), Some(id)) = (position, row.integer(REFERENCED_COLUMN)) {
            positions.insert(position, id);
        }
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_compare_by_identity() {
        let a = Entity::new(Weak::new(), "Game", 1);
        let b = Entity::new(Weak::new(), "Game", 1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_closed_factory() {
        let orphan = Entity::new(Weak::new(), "Game", 1);
        orphan.set_state(State::Live);
        assert!(matches!(orphan.get("name"), Err(OrmError::FactoryClosed)));
        // idx needs no factory.
        assert_eq!(orphan.get("idx").unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_deleted_instance_is_stale() {
        let orphan = Entity::new(Weak::new(), "Game", 4);
        orphan.set_state(State::Deleted);
        assert!(matches!(
            orphan.set("name", "x"),
            Err(OrmError::StaleInstance { idx: 4, .. })
        ));
        assert!(orphan.delete().is_ok());
        assert!(!orphan.reload().unwrap());
    }

    #[test]
    fn test_update_positions_creates_slot() {
        let entity = Entity::new(Weak::new(), "Cred", 1);
        entity.update_positions("friends", |p| p.insert(2, 9));
        assert_eq!(entity.positions("friends").get(&2), Some(&9));
        assert!(entity.positions("other").is_empty());
    }
}
