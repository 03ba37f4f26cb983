//! Identity maps and the lifecycle journal.
//!
//! The [`Registry`] keeps one [`IdentityMap`] per entity type, each mapping a
//! row id to the single live instance for that row. The maps hold strong
//! handles: an instance stays canonical until it is deleted or the factory
//! is dropped.
//!
//! The [`Journal`] records instances created, deleted, or written during a
//! savepoint-wrapped operation so that a rollback can put the in-memory
//! state back in line with the database.

use std::collections::HashMap;

use crate::entity::Entity;

/// Row id → canonical instance for one entity type.
#[derive(Default)]
pub(crate) struct IdentityMap {
    instances: HashMap<i64, Entity>,
}

impl IdentityMap {
    pub(crate) fn get(&self, idx: i64) -> Option<Entity> {
        self.instances.get(&idx).cloned()
    }

    pub(crate) fn insert(&mut self, entity: Entity) {
        self.instances.insert(entity.idx(), entity);
    }

    pub(crate) fn remove(&mut self, idx: i64) -> Option<Entity> {
        self.instances.remove(&idx)
    }

    pub(crate) fn contains(&self, idx: i64) -> bool {
        self.instances.contains_key(&idx)
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }
}

/// Identity maps for every entity type of a factory.
#[derive(Default)]
pub(crate) struct Registry {
    maps: HashMap<String, IdentityMap>,
}

impl Registry {
    pub(crate) fn lookup(&self, entity: &str, idx: i64) -> Option<Entity> {
        self.maps.get(entity).and_then(|map| map.get(idx))
    }

    pub(crate) fn register(&mut self, entity: Entity) {
        self.maps
            .entry(entity.entity_name().to_string())
            .or_default()
            .insert(entity);
    }

    pub(crate) fn evict(&mut self, entity: &str, idx: i64) -> Option<Entity> {
        self.maps.get_mut(entity).and_then(|map| map.remove(idx))
    }

    pub(crate) fn contains(&self, entity: &str, idx: i64) -> bool {
        self.maps.get(entity).is_some_and(|map| map.contains(idx))
    }

    pub(crate) fn len(&self, entity: &str) -> usize {
        self.maps.get(entity).map_or(0, IdentityMap::len)
    }

    /// Removes and returns every registered instance.
    pub(crate) fn drain(&mut self) -> Vec<Entity> {
        self.maps
            .drain()
            .flat_map(|(_, map)| map.instances.into_values())
            .collect()
    }
}

/// Position in a [`Journal`], taken when a savepoint opens.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark {
    created: usize,
    deleted: usize,
    touched: usize,
}

/// In-memory effects of the operations inside open savepoints.
#[derive(Default)]
pub(crate) struct Journal {
    pub(crate) created: Vec<Entity>,
    pub(crate) deleted: Vec<Entity>,
    pub(crate) touched: Vec<Entity>,
}

impl Journal {
    pub(crate) fn mark(&self) -> Mark {
        Mark {
            created: self.created.len(),
            deleted: self.deleted.len(),
            touched: self.touched.len(),
        }
    }

    /// Removes and returns everything recorded after `mark`.
    pub(crate) fn split_off(&mut self, mark: Mark) -> Journal {
        Journal {
            created: self.created.split_off(mark.created.min(self.created.len())),
            deleted: self.deleted.split_off(mark.deleted.min(self.deleted.len())),
            touched: self.touched.split_off(mark.touched.min(self.touched.len())),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.created.clear();
        self.deleted.clear();
        self.touched.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.touched.is_empty()
    }
}
