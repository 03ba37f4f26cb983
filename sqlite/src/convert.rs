//! Conversion between SQLite values and field values.
//!
//! Column data is held as [`SqlValue`] in instance slots and converted on
//! the way in (from [`Input`]) and on the way out (to [`Value`] or JSON).

use serde_json::Value as Json;

use crate::storage::SqlValue;
use crate::value::{Input, Value};

/// Converts a scalar input to its storage form; `None` for entities,
/// records, and lists.
pub(crate) fn input_to_sql(input: &Input) -> Option<SqlValue> {
    match input {
        Input::Null => Some(SqlValue::Null),
        Input::Integer(i) => Some(SqlValue::Integer(*i)),
        Input::Real(f) => Some(SqlValue::Real(*f)),
        Input::Text(s) => Some(SqlValue::Text(s.clone())),
        Input::Blob(b) => Some(SqlValue::Blob(b.clone())),
        Input::Entity(_) | Input::Record(_) | Input::List(_) => None,
    }
}

pub(crate) fn sql_to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

/// JSON form of a column value; blobs become arrays of bytes.
pub(crate) fn sql_to_json(value: &SqlValue) -> Json {
    match value {
        SqlValue::Null => Json::Null,
        SqlValue::Integer(i) => Json::from(*i),
        SqlValue::Real(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        SqlValue::Text(s) => Json::String(s.clone()),
        SqlValue::Blob(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
    }
}

/// Reads an integer column, treating anything else as absent.
pub(crate) fn sql_to_id(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(i) => Some(*i),
        _ => None,
    }
}
