//! Field values read from and written to live objects.
//!
//! [`Value`] is what [`Entity::get`](crate::Entity::get) returns; [`Input`]
//! is what [`Entity::set`](crate::Entity::set) and
//! [`EntityType::create`](crate::EntityType::create) accept. Inputs convert
//! from plain Rust values and from `serde_json::Value`, so construction
//! can be written as JSON.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_sqlite::Input;
//!
//! let input = Input::from(json!({"username": "bill", "tags": [null, {"label": "x"}]}));
//! assert!(matches!(input, Input::Record(_)));
//!
//! let record = Input::record([("name", "g1")]);
//! assert_eq!(record.kind(), "record");
//! ```

use crate::array::ArrayField;
use crate::entity::Entity;

/// A field value read from a live object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Live instance behind a reference field.
    Entity(Entity),
    /// Association proxy for an array field.
    Array(ArrayField),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayField> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<ArrayField> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// A value written to a field or passed to construction.
///
/// `Record` is plain data: writing it to a reference field or array
/// position constructs a new instance of the target entity. `List` replaces
/// a whole array; `None` elements leave their position empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// An existing live instance.
    Entity(Entity),
    /// Field name → value, in the order given.
    Record(Vec<(String, Input)>),
    /// Sparse sequence of array elements.
    List(Vec<Option<Input>>),
}

impl Input {
    /// Builds a record from `(field, value)` pairs.
    pub fn record<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Record(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Builds a dense list.
    pub fn list<V: Into<Input>>(items: impl IntoIterator<Item = V>) -> Self {
        Input::List(items.into_iter().map(|v| Some(v.into())).collect())
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Null => "null",
            Input::Integer(_) => "integer",
            Input::Real(_) => "real",
            Input::Text(_) => "text",
            Input::Blob(_) => "blob",
            Input::Entity(_) => "entity",
            Input::Record(_) => "record",
            Input::List(_) => "list",
        }
    }

    /// Like [`kind`](Self::kind), naming the entity type of live instances.
    pub(crate) fn describe(&self) -> String {
        match self {
            Input::Entity(e) => format!("{} entity", e.entity_name()),
            other => other.kind().to_string(),
        }
    }

    pub(crate) fn is_scalar(&self) -> bool {
        matches!(
            self,
            Input::Null | Input::Integer(_) | Input::Real(_) | Input::Text(_) | Input::Blob(_)
        )
    }
}

impl From<i64> for Input {
    fn from(v: i64) -> Self {
        Input::Integer(v)
    }
}

impl From<i32> for Input {
    fn from(v: i32) -> Self {
        Input::Integer(i64::from(v))
    }
}

impl From<bool> for Input {
    fn from(v: bool) -> Self {
        Input::Integer(i64::from(v))
    }
}

impl From<f64> for Input {
    fn from(v: f64) -> Self {
        Input::Real(v)
    }
}

impl From<&str> for Input {
    fn from(v: &str) -> Self {
        Input::Text(v.to_string())
    }
}

impl From<String> for Input {
    fn from(v: String) -> Self {
        Input::Text(v)
    }
}

impl From<Vec<u8>> for Input {
    fn from(v: Vec<u8>) -> Self {
        Input::Blob(v)
    }
}

impl From<Entity> for Input {
    fn from(v: Entity) -> Self {
        Input::Entity(v)
    }
}

impl From<&Entity> for Input {
    fn from(v: &Entity) -> Self {
        Input::Entity(v.clone())
    }
}

impl From<Vec<Entity>> for Input {
    fn from(v: Vec<Entity>) -> Self {
        Input::list(v)
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(v: Option<T>) -> Self {
        v.map_or(Input::Null, Into::into)
    }
}

impl From<serde_json::Value> for Input {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Input::Null,
            Json::Bool(b) => Input::from(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Input::Integer(i),
                None => Input::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Input::Text(s),
            Json::Array(items) => Input::List(
                items
                    .into_iter()
                    .map(|item| (!item.is_null()).then(|| Input::from(item)))
                    .collect(),
            ),
            Json::Object(map) => Input::Record(map.into_iter().map(|(k, v)| (k, Input::from(v))).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_numbers() {
        assert_eq!(Input::from(json!(3)), Input::Integer(3));
        assert_eq!(Input::from(json!(1.5)), Input::Real(1.5));
        assert_eq!(Input::from(json!(true)), Input::Integer(1));
    }

    #[test]
    fn test_json_list_keeps_holes() {
        let input = Input::from(json!([null, {"a": 1}]));
        match input {
            Input::List(items) => {
                assert_eq!(items.len(), 2);
                assert!(items[0].is_none());
                assert_eq!(items[1], Some(Input::record([("a", 1i64)])));
            }
            other => panic!("expected a list, got {}", other.kind()),
        }
    }

    #[test]
    fn test_json_record_keeps_order() {
        let Input::Record(fields) = Input::from(json!({"z": 1, "a": 2})) else {
            panic!("expected a record");
        };
        let names: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn test_option_input() {
        assert_eq!(Input::from(None::<i64>), Input::Null);
        assert_eq!(Input::from(Some("x")), Input::Text("x".into()));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(2).as_f64(), Some(2.0));
        assert_eq!(Value::Text("a".into()).as_str(), Some("a"));
        assert!(Value::Null.is_null());
        assert!(Value::Real(1.0).as_i64().is_none());
    }
}
