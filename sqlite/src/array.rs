//! Association proxy for array fields.
//!
//! An [`ArrayField`] is an ordered, sparse map from position to instance,
//! backed by the `(position, owner_id, referenced_id)` rows of the field's
//! association table. Positions without a row are empty; `len` is one past
//! the highest occupied position.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_db::StoreConfig;
//! use sqlreflect_sqlite::Factory;
//!
//! let factory = Factory::from_raw(
//!     &json!({"Cred": {"username": "TEXT", "friends": "[]@Cred"}}),
//!     StoreConfig::in_memory(),
//! ).unwrap();
//! factory.create_tables().unwrap();
//!
//! let creds = factory.entity("Cred").unwrap();
//! let c1 = creds.create(json!({"username": "a"})).unwrap();
//! let c2 = creds.create(json!({"username": "b"})).unwrap();
//!
//! let friends = c1.array("friends").unwrap();
//! friends.push(&c2).unwrap();
//! assert_eq!(friends.get(0).unwrap(), Some(c2));
//! assert_eq!(friends.len().unwrap(), 1);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use sqlreflect_core::{FieldKind, OWNER_COLUMN, Ownership, POSITION_COLUMN, REFERENCED_COLUMN};
use tracing::trace;

use crate::entity::{Entity, construct_for, hydrate, release};
use crate::error::{OrmError, Result};
use crate::factory::Context;
use crate::schema::quote_ident;
use crate::storage::SqlValue;
use crate::value::Input;

/// Resolved array field descriptor.
struct Spec {
    target: String,
    table: String,
    ownership: Ownership,
}

/// Proxy for one array field of one owner instance.
#[derive(Clone)]
pub struct ArrayField {
    owner: Entity,
    field: String,
}

impl ArrayField {
    pub(crate) fn new(owner: Entity, field: &str) -> Self {
        Self {
            owner,
            field: field.to_string(),
        }
    }

    pub fn owner(&self) -> &Entity {
        &self.owner
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// One past the highest occupied position.
    pub fn len(&self) -> Result<usize> {
        self.owner.ensure_live()?;
        Ok(self
            .owner
            .positions(&self.field)
            .keys()
            .next_back()
            .map_or(0, |p| p + 1))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Instance at `position`; `None` for empty positions and for elements
    /// whose row no longer exists.
    pub fn get(&self, position: usize) -> Result<Option<Entity>> {
        let (ctx, spec) = self.open()?;
        match self.owner.positions(&self.field).get(&position) {
            Some(&id) => hydrate(&ctx, ctx.table(&spec.target)?, id),
            None => Ok(None),
        }
    }

    /// Stores an instance at `position`, replacing whatever was there.
    ///
    /// A record constructs a new target instance; owned targets are linked
    /// to this owner. Overwriting a position of an owned array releases the
    /// previous element.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::TypeMismatch`] for instances of another entity
    /// type and [`OrmError::InvalidArrayElement`] for primitives, null, and
    /// lists.
    pub fn set(&self, position: usize, value: impl Into<Input>) -> Result<Entity> {
        let (ctx, spec) = self.open()?;
        self.position_param(position)?;
        match value.into() {
            Input::Entity(element) => {
                self.check_element(&spec, &element)?;
                ctx.atomically(|| self.put(&ctx, &spec, position, &element))?;
                Ok(element)
            }
            Input::Record(fields) => ctx.atomically(|| {
                let element = construct_for(&ctx, &spec.target, spec.ownership, fields, self.owner.idx())?;
                self.put(&ctx, &spec, position, &element)?;
                Ok(element)
            }),
            other => Err(self.invalid(&other)),
        }
    }

    /// Empties `position`, returning the element that was there.
    ///
    /// Owned elements are released.
    pub fn remove(&self, position: usize) -> Result<Option<Entity>> {
        let (ctx, spec) = self.open()?;
        let Some(&previous) = self.owner.positions(&self.field).get(&position) else {
            return Ok(None);
        };
        let element = hydrate(&ctx, ctx.table(&spec.target)?, previous)?;

        ctx.atomically(|| {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                quote_ident(&spec.table),
                quote_ident(POSITION_COLUMN),
                quote_ident(OWNER_COLUMN)
            );
            ctx.storage
                .execute(&sql, &[self.position_param(position)?, self.owner_param()])?;
            self.owner.update_positions(&self.field, |p| p.remove(&position));
            ctx.record_touched(&self.owner);

            if spec.ownership.is_owned() {
                release(&ctx, &spec.target, previous)?;
            }
            Ok(())
        })?;
        Ok(element)
    }

    /// Stores at position `len()`.
    pub fn push(&self, value: impl Into<Input>) -> Result<Entity> {
        let position = self.len()?;
        self.set(position, value)
    }

    /// Removes the element at the highest occupied position.
    pub fn pop(&self) -> Result<Option<Entity>> {
        match self.len()? {
            0 => Ok(None),
            len => self.remove(len - 1),
        }
    }

    /// Empties every position, releasing owned elements.
    pub fn clear(&self) -> Result<()> {
        let (ctx, spec) = self.open()?;
        let previous = self.owner.positions(&self.field);

        ctx.atomically(|| {
            self.delete_rows(&ctx, &spec)?;
            if spec.ownership.is_owned() {
                release_all(&ctx, &spec, previous.values().copied(), &HashSet::new())?;
            }
            Ok(())
        })
    }

    /// Replaces the whole array; `None` items leave their position empty.
    ///
    /// Owned elements that are not part of the new contents are released.
    pub(crate) fn replace(&self, items: Vec<Option<Input>>) -> Result<()> {
        let (ctx, spec) = self.open()?;
        for item in items.iter().flatten() {
            match item {
                Input::Entity(element) => self.check_element(&spec, element)?,
                Input::Record(_) => {}
                other => return Err(self.invalid(other)),
            }
        }
        let previous = self.owner.positions(&self.field);

        ctx.atomically(|| {
            self.delete_rows(&ctx, &spec)?;
            let mut kept = HashSet::new();
            for (position, item) in items.into_iter().enumerate() {
                let element = match item {
                    None => continue,
                    Some(Input::Entity(element)) => element,
                    Some(Input::Record(fields)) => {
                        construct_for(&ctx, &spec.target, spec.ownership, fields, self.owner.idx())?
                    }
                    Some(other) => return Err(self.invalid(&other)),
                };
                self.store(&ctx, &spec, position, element.idx())?;
                kept.insert(element.idx());
            }
            if spec.ownership.is_owned() {
                release_all(&ctx, &spec, previous.values().copied(), &kept)?;
            }
            Ok(())
        })
    }

    /// Occupied positions, ascending.
    pub fn positions(&self) -> Result<Vec<usize>> {
        self.owner.ensure_live()?;
        Ok(self.owner.positions(&self.field).into_keys().collect())
    }

    /// `(position, row id)` pairs as stored, without hydrating.
    pub fn ids(&self) -> Result<Vec<(usize, i64)>> {
        self.owner.ensure_live()?;
        Ok(self.owner.positions(&self.field).into_iter().collect())
    }

    /// Occupied `(position, instance)` pairs, ascending. Dangling elements
    /// are skipped.
    pub fn entries(&self) -> Result<Vec<(usize, Entity)>> {
        let (ctx, spec) = self.open()?;
        let table = ctx.table(&spec.target)?;
        let mut out = Vec::new();
        for (position, id) in self.owner.positions(&self.field) {
            if let Some(element) = hydrate(&ctx, table, id)? {
                out.push((position, element));
            }
        }
        Ok(out)
    }

    /// Dense view of length `len()`, with `None` for empty positions.
    pub fn to_vec(&self) -> Result<Vec<Option<Entity>>> {
        let mut out = vec![None; self.len()?];
        for (position, element) in self.entries()? {
            out[position] = Some(element);
        }
        Ok(out)
    }

    fn open(&self) -> Result<(Rc<Context>, Spec)> {
        self.owner.ensure_live()?;
        let ctx = self.owner.context()?;
        let table = ctx.table(self.owner.entity_name())?;
        let spec = match table.field(&self.field).map(|f| &f.kind) {
            Some(FieldKind::Array {
                target,
                table,
                ownership,
            }) => Spec {
                target: target.clone(),
                table: table.clone(),
                ownership: *ownership,
            },
            Some(_) => {
                return Err(self.owner.mismatch(&self.field, "an array field", "a column"));
            }
            None => {
                return Err(OrmError::UnknownField {
                    entity: self.owner.entity_name().to_string(),
                    field: self.field.clone(),
                });
            }
        };
        Ok((ctx, spec))
    }

    fn check_element(&self, spec: &Spec, element: &Entity) -> Result<()> {
        if element.entity_name() != spec.target {
            return Err(self.owner.mismatch(
                &self.field,
                &spec.target,
                &format!("{} entity", element.entity_name()),
            ));
        }
        element.ensure_live()
    }

    fn invalid(&self, value: &Input) -> OrmError {
        OrmError::InvalidArrayElement {
            entity: self.owner.entity_name().to_string(),
            field: self.field.clone(),
            found: value.describe(),
        }
    }

    fn owner_param(&self) -> SqlValue {
        SqlValue::Integer(self.owner.idx())
    }

    /// Positions are stored as SQLite integers; larger ones are rejected.
    fn position_param(&self, position: usize) -> Result<SqlValue> {
        i64::try_from(position)
            .map(SqlValue::Integer)
            .map_err(|_| OrmError::InvalidArrayElement {
                entity: self.owner.entity_name().to_string(),
                field: self.field.clone(),
                found: format!("position {position} out of range"),
            })
    }

    /// Writes one association row and releases an overwritten owned element.
    fn put(&self, ctx: &Rc<Context>, spec: &Spec, position: usize, element: &Entity) -> Result<()> {
        let previous = self.store(ctx, spec, position, element.idx())?;
        if let Some(previous) = previous.filter(|p| *p != element.idx()) {
            if spec.ownership.is_owned() {
                release(ctx, &spec.target, previous)?;
            }
        }
        Ok(())
    }

    /// Upserts `(position, owner, id)`; returns the id previously there.
    fn store(&self, ctx: &Context, spec: &Spec, position: usize, id: i64) -> Result<Option<i64>> {
        let previous = self.owner.positions(&self.field).get(&position).copied();
        if previous == Some(id) {
            return Ok(previous);
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3)",
            quote_ident(&spec.table),
            quote_ident(POSITION_COLUMN),
            quote_ident(OWNER_COLUMN),
            quote_ident(REFERENCED_COLUMN)
        );
        ctx.storage.execute(
            &sql,
            &[self.position_param(position)?, self.owner_param(), SqlValue::Integer(id)],
        )?;
        self.owner.update_positions(&self.field, |p| p.insert(position, id));
        ctx.record_touched(&self.owner);
        trace!(table = %spec.table, position, id, "stored array element");
        Ok(previous)
    }

    fn delete_rows(&self, ctx: &Context, spec: &Spec) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&spec.table),
            quote_ident(OWNER_COLUMN)
        );
        ctx.storage.execute(&sql, &[self.owner_param()])?;
        self.owner.update_positions(&self.field, BTreeMap::clear);
        ctx.record_touched(&self.owner);
        Ok(())
    }
}

fn release_all(
    ctx: &Rc<Context>,
    spec: &Spec,
    ids: impl Iterator<Item = i64>,
    kept: &HashSet<i64>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !kept.contains(&id) && seen.insert(id) {
            release(ctx, &spec.target, id)?;
        }
    }
    Ok(())
}


impl PartialEq for ArrayField {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.field == other.field
    }
}

impl std::fmt::Debug for ArrayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayField")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .finish()
    }
}
