//! Nested schema normalization.
//!
//! Expands a raw, possibly deeply nested schema document into a flat
//! [`Schema`]. The raw document maps entity names to field mappings, where
//! each field is one of:
//!
//! - `"VARCHAR(64)"`: a primitive column.
//! - `"@Game"`: a shared reference to a declared entity. Column modifiers
//!   around the marker are kept (`"@Game NOT NULL"` → `INTEGER NOT NULL`).
//! - `["@Cred"]` or `"[]@Cred"`: an array of shared references.
//! - `{ ... }`: an owned object, promoted to a synthetic entity.
//! - `[{ ... }]`: an array of owned objects, promoted the same way.
//!
//! Keys starting with `$` are directives; only `$append` (a clause or list
//! of clauses appended to the table definition) is recognized.
//!
//! Synthetic entities are named `_t0`, `_t1`, ... in walk order, skipping any
//! declared name. Named references, including self references, are never
//! expanded, which is what keeps the walk finite on cyclic schemas.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_core::{FieldKind, Ownership, normalize};
//!
//! let schema = normalize(&json!({
//!     "Cred": {
//!         "username": "VARCHAR(32)",
//!         "name": { "first": "TEXT", "last": "TEXT" },
//!         "friends": ["@Cred"]
//!     }
//! }))
//! .unwrap();
//!
//! let cred = schema.get("Cred").unwrap();
//! let name = cred.field("name").unwrap();
//! assert!(matches!(
//!     &name.kind,
//!     FieldKind::Reference { target, ownership: Ownership::Owned, .. } if target == "_t0"
//! ));
//! assert_eq!(schema.get("_t0").unwrap().nested.as_ref().unwrap().parent, "Cred");
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{
    FieldDescriptor, FieldKind, IDX_COLUMN, Nested, Ownership, RIDX_COLUMN, Schema,
    TableDescriptor, association_table_name, table_name,
};
use crate::validate::{Result, SchemaError, validate_field_name, validate_identifier};

/// Marker introducing a reference inside a field descriptor string.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").expect("static regex must compile")
});

/// Prefix marking a string descriptor as an array of references.
const ARRAY_MARKER: &str = "[]";

/// Directive holding extra table clauses.
const APPEND_DIRECTIVE: &str = "$append";

/// Prefix of generated entity names.
const SYNTHETIC_PREFIX: &str = "_t";

/// Normalizes a raw schema document.
///
/// # Errors
///
/// Returns a [`SchemaError`] describing the first malformed entity, field,
/// or directive encountered, or a table name collision.
pub fn normalize(raw: &Value) -> Result<Schema> {
    let entities = raw.as_object().ok_or(SchemaError::NotAMapping)?;
    let mut normalizer = Normalizer::new(entities)?;
    for (entity, fields) in entities {
        let fields = fields
            .as_object()
            .ok_or_else(|| SchemaError::EntityNotAMapping(entity.clone()))?;
        normalizer.expand(entity, fields, None)?;
    }
    normalizer.finish()
}

/// Parsed form of a reference descriptor string.
struct ParsedReference {
    target: String,
    sql_type: String,
}

/// Extracts the reference marker from a descriptor string.
///
/// Returns `Ok(None)` for plain column types.
fn parse_reference(entity: &str, field: &str, descriptor: &str) -> Result<Option<ParsedReference>> {
    let mut markers = REFERENCE_RE.find_iter(descriptor);
    let Some(marker) = markers.next() else {
        return Ok(None);
    };
    if markers.next().is_some() {
        return Err(invalid(entity, field, "more than one reference marker"));
    }
    let before = &descriptor[..marker.start()];
    let after = &descriptor[marker.end()..];
    Ok(Some(ParsedReference {
        target: marker.as_str().trim_start_matches('@').to_string(),
        sql_type: format!("{before}INTEGER{after}").trim().to_string(),
    }))
}

fn invalid(entity: &str, field: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidField {
        entity: entity.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

struct Normalizer {
    /// Declared entity names.
    declared: HashSet<String>,
    /// Lowercased table names of declared entities, for synthetic name skipping.
    declared_tables: HashSet<String>,
    counter: usize,
    tables: Vec<TableDescriptor>,
}

impl Normalizer {
    fn new(entities: &Map<String, Value>) -> Result<Self> {
        let mut declared = HashSet::new();
        let mut declared_tables = HashSet::new();
        for entity in entities.keys() {
            validate_identifier(entity)?;
            if !declared_tables.insert(table_name(entity)) {
                return Err(SchemaError::DuplicateTable(table_name(entity)));
            }
            declared.insert(entity.clone());
        }
        Ok(Self {
            declared,
            declared_tables,
            counter: 0,
            tables: Vec::new(),
        })
    }

    /// Allocates the next synthetic entity name not taken by a declared entity.
    fn next_name(&mut self) -> String {
        loop {
            let name = format!("{SYNTHETIC_PREFIX}{}", self.counter);
            self.counter += 1;
            if !self.declared_tables.contains(&table_name(&name)) {
                return name;
            }
        }
    }

    /// Normalizes one entity and, depth first, every structure embedded in it.
    ///
    /// The entity's slot is reserved before recursing so that the output keeps
    /// each parent ahead of its synthetic descendants.
    fn expand(&mut self, entity: &str, fields: &Map<String, Value>, nested: Option<Nested>) -> Result<()> {
        let slot = self.tables.len();
        let mut table = TableDescriptor::new(entity);
        self.tables.push(table.clone());

        if let Some(owner) = &nested {
            table.synthetic = true;
            table
                .fields
                .push(FieldDescriptor::primitive(RIDX_COLUMN, "INTEGER NOT NULL"));
            table.append.push(format!(
                "FOREIGN KEY (\"{RIDX_COLUMN}\") REFERENCES \"{}\" (\"{IDX_COLUMN}\") ON DELETE CASCADE",
                table_name(&owner.parent)
            ));
        }
        table.nested = nested;

        for (key, value) in fields {
            if key.starts_with('$') {
                self.directive(&mut table, key, value)?;
                continue;
            }
            validate_field_name(entity, key)?;
            let field = self.classify(&table, key, value)?;
            table.fields.push(field);
        }

        self.tables[slot] = table;
        Ok(())
    }

    fn directive(&self, table: &mut TableDescriptor, key: &str, value: &Value) -> Result<()> {
        if key != APPEND_DIRECTIVE {
            return Err(SchemaError::UnknownDirective {
                entity: table.entity.clone(),
                directive: key.to_string(),
            });
        }
        match value {
            Value::String(clause) => table.append.push(clause.clone()),
            Value::Array(clauses) => {
                for clause in clauses {
                    let clause = clause.as_str().ok_or_else(|| {
                        invalid(&table.entity, key, "clauses must be strings")
                    })?;
                    table.append.push(clause.to_string());
                }
            }
            _ => {
                return Err(invalid(
                    &table.entity,
                    key,
                    "expected a clause or a list of clauses",
                ));
            }
        }
        Ok(())
    }

    fn classify(&mut self, table: &TableDescriptor, key: &str, value: &Value) -> Result<FieldDescriptor> {
        let entity = table.entity.as_str();
        let kind = match value {
            Value::String(descriptor) => self.classify_string(table, key, descriptor)?,
            Value::Object(embedded) => {
                let target = self.promote(entity, key, embedded, false)?;
                FieldKind::Reference {
                    target,
                    sql_type: "INTEGER".to_string(),
                    ownership: Ownership::Owned,
                }
            }
            Value::Array(items) => match items.as_slice() {
                [Value::String(element)] => {
                    let target = self.array_reference(entity, key, element)?;
                    FieldKind::Array {
                        target,
                        table: association_table_name(&table.table, key),
                        ownership: Ownership::Shared,
                    }
                }
                [Value::Object(embedded)] => {
                    let target = self.promote(entity, key, embedded, true)?;
                    FieldKind::Array {
                        target,
                        table: association_table_name(&table.table, key),
                        ownership: Ownership::Owned,
                    }
                }
                [Value::Array(_)] => return Err(invalid(entity, key, "nested arrays are not supported")),
                [_] => return Err(invalid(entity, key, "array element must be a reference or a mapping")),
                _ => return Err(invalid(entity, key, "array descriptor must have exactly one element")),
            },
            Value::Null | Value::Bool(_) | Value::Number(_) => {
                return Err(invalid(entity, key, "expected a string, mapping, or single-element array"));
            }
        };
        Ok(FieldDescriptor {
            name: key.to_string(),
            kind,
        })
    }

    fn classify_string(&self, table: &TableDescriptor, key: &str, descriptor: &str) -> Result<FieldKind> {
        let entity = table.entity.as_str();
        let trimmed = descriptor.trim();
        if trimmed.is_empty() {
            return Err(invalid(entity, key, "empty column type"));
        }
        if let Some(element) = trimmed.strip_prefix(ARRAY_MARKER) {
            let target = self.array_reference(entity, key, element)?;
            return Ok(FieldKind::Array {
                target,
                table: association_table_name(&table.table, key),
                ownership: Ownership::Shared,
            });
        }
        match parse_reference(entity, key, trimmed)? {
            Some(reference) => {
                self.check_declared(entity, key, &reference.target)?;
                Ok(FieldKind::Reference {
                    target: reference.target,
                    sql_type: reference.sql_type,
                    ownership: Ownership::Shared,
                })
            }
            None => Ok(FieldKind::Primitive {
                sql_type: trimmed.to_string(),
            }),
        }
    }

    /// Resolves the element of an array of references; only a bare marker is accepted.
    fn array_reference(&self, entity: &str, key: &str, element: &str) -> Result<String> {
        let element = element.trim();
        match parse_reference(entity, key, element)? {
            Some(reference) if reference.sql_type == "INTEGER" => {
                self.check_declared(entity, key, &reference.target)?;
                Ok(reference.target)
            }
            Some(_) => Err(invalid(entity, key, "array elements take a bare reference")),
            None => Err(invalid(entity, key, "arrays may only hold entity references")),
        }
    }

    fn check_declared(&self, entity: &str, key: &str, target: &str) -> Result<()> {
        if self.declared.contains(target) {
            Ok(())
        } else {
            Err(SchemaError::UnresolvedReference {
                entity: entity.to_string(),
                field: key.to_string(),
                target: target.to_string(),
            })
        }
    }

    /// Promotes an embedded mapping to a synthetic entity and returns its name.
    fn promote(&mut self, parent: &str, key: &str, embedded: &Map<String, Value>, array: bool) -> Result<String> {
        let name = self.next_name();
        debug!(parent, field = key, synthetic = %name, array, "promoting embedded structure");
        let nested = Nested {
            parent: parent.to_string(),
            column: key.to_string(),
            array,
        };
        self.expand(&name, embedded, Some(nested))?;
        Ok(name)
    }

    fn finish(self) -> Result<Schema> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            let names = std::iter::once(table.table.clone()).chain(table.fields.iter().filter_map(
                |f| match &f.kind {
                    FieldKind::Array { table, .. } => Some(table.clone()),
                    _ => None,
                },
            ));
            for name in names {
                if !seen.insert(name.clone()) {
                    return Err(SchemaError::DuplicateTable(name));
                }
            }
        }
        Ok(Schema::new(self.tables))
    }
}
