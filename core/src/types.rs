//! Table and field descriptors produced by normalization.
//!
//! A [`Schema`] is a flat, ordered collection of [`TableDescriptor`]s. Every
//! nested or embedded structure of the raw schema has already been promoted
//! to its own synthetic entity by the time a descriptor exists, so consumers
//! (the DDL builder, the live object factory) only ever deal with three
//! shapes of field: primitive columns, references, and arrays of references.
//!
//! Descriptors are immutable once normalization finishes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the primary key column present on every object table.
pub const IDX_COLUMN: &str = "idx";

/// Name of the back-reference column added to synthetic owned entities.
pub const RIDX_COLUMN: &str = "ridx";

/// Association table column holding the array position.
pub const POSITION_COLUMN: &str = "position";

/// Association table column holding the owning row id.
pub const OWNER_COLUMN: &str = "owner_id";

/// Association table column holding the referenced row id.
pub const REFERENCED_COLUMN: &str = "referenced_id";

/// Whether a relation exclusively owns the rows it points at.
///
/// # Examples
///
/// ```
/// use sqlreflect_core::Ownership;
///
/// assert_eq!(Ownership::default(), Ownership::Shared);
/// assert!(Ownership::Owned.is_owned());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// The referenced row has an independent lifecycle (the default).
    #[default]
    Shared,
    /// The referenced row lives and dies with its owner(s).
    Owned,
}

impl Ownership {
    /// Returns `true` for [`Ownership::Owned`].
    pub fn is_owned(self) -> bool {
        matches!(self, Ownership::Owned)
    }
}

/// Classification of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain storage column; `sql_type` is used verbatim in DDL.
    Primitive {
        /// Column type and modifiers, e.g. `VARCHAR(64)`.
        sql_type: String,
    },
    /// Foreign-key column pointing at another entity's `idx`.
    Reference {
        /// Target entity name.
        target: String,
        /// Column type with the reference marker replaced by `INTEGER`.
        sql_type: String,
        /// Shared reference or owned (nested) object.
        ownership: Ownership,
    },
    /// Ordered sparse sequence stored in an association table.
    Array {
        /// Target entity name.
        target: String,
        /// Association table name.
        table: String,
        /// Array of shared references or array of owned objects.
        ownership: Ownership,
    },
}

/// A named field of a table descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column (or array field) name.
    pub name: String,
    /// What kind of field this is.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Creates a primitive column descriptor.
    pub fn primitive(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Primitive {
                sql_type: sql_type.into(),
            },
        }
    }

    /// Returns `true` if this field is backed by a column on the object table.
    pub fn is_column(&self) -> bool {
        !matches!(self.kind, FieldKind::Array { .. })
    }

    /// Returns `true` for primitive columns.
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, FieldKind::Primitive { .. })
    }

    /// Returns `true` for reference columns, owned or shared.
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. })
    }

    /// Returns `true` for array fields.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, FieldKind::Array { .. })
    }

    /// Target entity of a reference or array field.
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Primitive { .. } => None,
            FieldKind::Reference { target, .. } | FieldKind::Array { target, .. } => Some(target),
        }
    }

    /// Ownership of a reference or array field; primitives are never owned.
    pub fn ownership(&self) -> Ownership {
        match &self.kind {
            FieldKind::Primitive { .. } => Ownership::Shared,
            FieldKind::Reference { ownership, .. } | FieldKind::Array { ownership, .. } => {
                *ownership
            }
        }
    }

    /// Returns `true` for owned references and owned arrays.
    pub fn is_owned(&self) -> bool {
        self.ownership().is_owned()
    }
}

/// Ownership metadata recorded on synthetic entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nested {
    /// Entity that declared the embedded structure.
    pub parent: String,
    /// Field of the parent the structure was declared under.
    pub column: String,
    /// `true` when declared as `[{...}]`.
    pub array: bool,
}

/// Fully elaborated description of one entity and its object table.
///
/// # Examples
///
/// ```
/// use sqlreflect_core::{FieldDescriptor, TableDescriptor};
///
/// let mut table = TableDescriptor::new("Game");
/// table.fields.push(FieldDescriptor::primitive("name", "TEXT"));
/// assert_eq!(table.table, "game");
/// assert!(table.field("name").is_some());
/// assert!(table.field("missing").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Entity name as declared (or generated).
    pub entity: String,
    /// Object table name.
    pub table: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// Extra table clauses appended verbatim after the generated columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append: Vec<String>,
    /// Present when the entity was synthesized from an embedded structure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Nested>,
    /// `true` for entities generated by the normalizer.
    #[serde(default)]
    pub synthetic: bool,
}

impl TableDescriptor {
    /// Creates an empty user-declared descriptor; the table name is the
    /// lowercased entity name.
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            table: table_name(&entity),
            entity,
            fields: Vec::new(),
            append: Vec::new(),
            nested: None,
            synthetic: false,
        }
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields backed by a column on the object table.
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_column())
    }

    /// Array fields.
    pub fn arrays(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_array())
    }

    /// Returns `true` if `name` is `idx` or a column of this table.
    pub fn has_column(&self, name: &str) -> bool {
        name == IDX_COLUMN || self.field(name).is_some_and(FieldDescriptor::is_column)
    }

    /// Returns `true` if writes to `name` must be rejected.
    pub fn is_read_only(&self, name: &str) -> bool {
        name == IDX_COLUMN || (self.nested.is_some() && name == RIDX_COLUMN)
    }
}

/// Derives the object table name for an entity.
pub fn table_name(entity: &str) -> String {
    entity.to_lowercase()
}

/// Derives the association table name for an array field.
pub fn association_table_name(owner_table: &str, field: &str) -> String {
    format!("{owner_table}_{}", field.to_lowercase())
}

/// Normalized schema: every entity, declared and synthetic, in build order.
///
/// Each declared entity is immediately followed by the synthetic entities
/// promoted from its embedded structures, so iterating in order creates
/// parents before the children that reference them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TableDescriptor>", into = "Vec<TableDescriptor>")]
pub struct Schema {
    tables: Vec<TableDescriptor>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Creates a schema from descriptors in build order.
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        let index = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.entity.clone(), i))
            .collect();
        Self { tables, index }
    }

    /// Looks up an entity descriptor by name.
    pub fn get(&self, entity: &str) -> Option<&TableDescriptor> {
        self.index.get(entity).map(|&i| &self.tables[i])
    }

    /// Returns `true` if the entity exists.
    pub fn contains(&self, entity: &str) -> bool {
        self.index.contains_key(entity)
    }

    /// Iterates descriptors in build order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    /// Iterates entity names in build order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.entity.as_str())
    }

    /// Number of entities, including synthetic ones.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if the schema has no entities.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Synthetic entities whose `nested.parent` is `entity`.
    pub fn children_of<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a TableDescriptor> {
        self.tables
            .iter()
            .filter(move |t| t.nested.as_ref().is_some_and(|n| n.parent == entity))
    }

    /// `entity` followed by all synthetic descendants, depth first.
    pub fn with_descendants<'a>(&'a self, entity: &str) -> Vec<&'a TableDescriptor> {
        let mut out = Vec::new();
        if let Some(root) = self.get(entity) {
            self.collect_descendants(root, &mut out);
        }
        out
    }

    fn collect_descendants<'a>(&'a self, table: &'a TableDescriptor, out: &mut Vec<&'a TableDescriptor>) {
        out.push(table);
        for child in self.children_of(&table.entity) {
            self.collect_descendants(child, out);
        }
    }
}

impl From<Vec<TableDescriptor>> for Schema {
    fn from(tables: Vec<TableDescriptor>) -> Self {
        Self::new(tables)
    }
}

impl From<Schema> for Vec<TableDescriptor> {
    fn from(schema: Schema) -> Self {
        schema.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, target: &str, ownership: Ownership) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Reference {
                target: target.into(),
                sql_type: "INTEGER".into(),
                ownership,
            },
        }
    }

    #[test]
    fn test_table_name_is_lowercased() {
        assert_eq!(TableDescriptor::new("GameModel").table, "gamemodel");
        assert_eq!(association_table_name("cred", "friends"), "cred_friends");
    }

    #[test]
    fn test_read_only_columns() {
        let mut table = TableDescriptor::new("_t0");
        assert!(table.is_read_only("idx"));
        assert!(!table.is_read_only("ridx"));
        table.nested = Some(Nested {
            parent: "Cred".into(),
            column: "name".into(),
            array: false,
        });
        assert!(table.is_read_only("ridx"));
    }

    #[test]
    fn test_field_classification() {
        let game = reference("game", "Game", Ownership::Shared);
        assert!(game.is_column());
        assert!(game.is_reference());
        assert!(!game.is_owned());
        assert_eq!(game.target(), Some("Game"));

        let name = reference("name", "_t0", Ownership::Owned);
        assert!(name.is_owned());

        let prim = FieldDescriptor::primitive("age", "INTEGER");
        assert!(prim.is_primitive());
        assert_eq!(prim.target(), None);
    }

    #[test]
    fn test_schema_descendants_in_depth_first_order() {
        let parent = TableDescriptor::new("Cred");
        let mut child = TableDescriptor::new("_t0");
        child.nested = Some(Nested {
            parent: "Cred".into(),
            column: "name".into(),
            array: false,
        });
        let mut grandchild = TableDescriptor::new("_t1");
        grandchild.nested = Some(Nested {
            parent: "_t0".into(),
            column: "inner".into(),
            array: true,
        });
        let other = TableDescriptor::new("Game");

        let schema = Schema::new(vec![parent, child, grandchild, other]);
        let names: Vec<_> = schema
            .with_descendants("Cred")
            .iter()
            .map(|t| t.entity.as_str())
            .collect();
        assert_eq!(names, vec!["Cred", "_t0", "_t1"]);
        assert!(schema.with_descendants("Missing").is_empty());
    }

    #[test]
    fn test_schema_serde_round_trip_keeps_index() {
        let schema = Schema::new(vec![TableDescriptor::new("Game")]);
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert!(back.contains("Game"));
        assert_eq!(back, schema);
    }
}
