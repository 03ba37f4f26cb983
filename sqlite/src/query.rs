//! Exact-match filters for entity lookups.
//!
//! A [`Filter`] is a conjunction of `column = value` conditions. Only `idx`
//! and column-backed fields (primitives and references) may be named; a
//! null value matches `IS NULL` and a live instance matches by its `idx`.
//!
//! # Example
//!
//! ```
//! use sqlreflect_sqlite::Filter;
//!
//! let filter = Filter::new().eq("username", "bill").eq("game", 1i64);
//! assert_eq!(filter.conditions().len(), 2);
//! ```

use sqlreflect_core::{FieldKind, IDX_COLUMN, TableDescriptor};

use crate::convert::input_to_sql;
use crate::error::{OrmError, Result};
use crate::schema::quote_ident;
use crate::storage::SqlValue;
use crate::value::Input;

/// Conjunction of equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Input)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `column = value` condition.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Input>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Input)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Renders a ` WHERE ...` clause (empty for an empty filter) and its
    /// parameters.
    pub(crate) fn to_sql(&self, table: &TableDescriptor) -> Result<(String, Vec<SqlValue>)> {
        let mut clauses = Vec::with_capacity(self.conditions.len());
        let mut params = Vec::new();

        for (column, value) in &self.conditions {
            if !table.has_column(column) {
                return Err(OrmError::UnknownField {
                    entity: table.entity.clone(),
                    field: column.clone(),
                });
            }

            let param = match value {
                Input::Null => {
                    clauses.push(format!("{} IS NULL", quote_ident(column)));
                    continue;
                }
                Input::Entity(entity) => {
                    check_target(table, column, entity.entity_name())?;
                    SqlValue::Integer(entity.idx())
                }
                other => input_to_sql(other).ok_or_else(|| OrmError::TypeMismatch {
                    entity: table.entity.clone(),
                    field: column.clone(),
                    expected: "a primitive value or entity".into(),
                    found: other.kind().into(),
                })?,
            };
            params.push(param);
            clauses.push(format!("{} = ?{}", quote_ident(column), params.len()));
        }

        if clauses.is_empty() {
            return Ok((String::new(), params));
        }
        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

fn check_target(table: &TableDescriptor, column: &str, found: &str) -> Result<()> {
    let expected = match table.field(column).map(|f| &f.kind) {
        Some(FieldKind::Reference { target, .. }) => target.as_str(),
        _ if column == IDX_COLUMN => table.entity.as_str(),
        _ => "a primitive value",
    };
    if expected == found {
        return Ok(());
    }
    Err(OrmError::TypeMismatch {
        entity: table.entity.clone(),
        field: column.to_string(),
        expected: expected.to_string(),
        found: format!("{found} entity"),
    })
}

impl From<serde_json::Map<String, serde_json::Value>> for Filter {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            conditions: map.into_iter().map(|(k, v)| (k, Input::from(v))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlreflect_core::normalize;

    fn cred() -> TableDescriptor {
        let schema = normalize(&json!({
            "Game": {"name": "TEXT"},
            "Cred": {"username": "TEXT", "game": "@Game", "friends": "[]@Cred"}
        }))
        .unwrap();
        schema.get("Cred").unwrap().clone()
    }

    #[test]
    fn test_empty_filter() {
        let (clause, params) = Filter::new().to_sql(&cred()).unwrap();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_equality_and_null() {
        let filter = Filter::new().eq("username", "bill").eq("game", Input::Null);
        let (clause, params) = filter.to_sql(&cred()).unwrap();
        assert_eq!(clause, " WHERE \"username\" = ?1 AND \"game\" IS NULL");
        assert_eq!(params, vec![SqlValue::Text("bill".into())]);
    }

    #[test]
    fn test_idx_is_filterable() {
        let (clause, _) = Filter::new().eq("idx", 3i64).to_sql(&cred()).unwrap();
        assert_eq!(clause, " WHERE \"idx\" = ?1");
    }

    #[test]
    fn test_array_fields_are_not_filterable() {
        let err = Filter::new().eq("friends", 1i64).to_sql(&cred()).unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { field, .. } if field == "friends"));
    }

    #[test]
    fn test_unknown_column() {
        let err = Filter::new().eq("password", "x").to_sql(&cred()).unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
    }

    #[test]
    fn test_from_json_map() {
        let serde_json::Value::Object(map) = json!({"username": "bill"}) else {
            panic!("expected an object");
        };
        let filter = Filter::from(map);
        assert_eq!(filter, Filter::new().eq("username", "bill"));
    }
}
