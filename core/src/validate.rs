//! Schema validation errors and identifier checks.
//!
//! Everything the normalizer can reject is reported as a [`SchemaError`] at
//! normalization time. Nothing malformed is allowed to survive until query
//! time.
//!
//! # Examples
//!
//! ```
//! use sqlreflect_core::{SchemaError, validate_identifier};
//!
//! assert!(validate_identifier("username").is_ok());
//! assert!(matches!(
//!     validate_identifier("drop;--"),
//!     Err(SchemaError::InvalidName(_))
//! ));
//! ```

use thiserror::Error;

use crate::types::{IDX_COLUMN, RIDX_COLUMN};

/// Schema normalization errors.
///
/// Each variant describes one structural problem with the raw schema. The
/// `Display` impl names the entity and field involved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema document is not a mapping of entity names to mappings.
    #[error("schema document must be a mapping of entity names to field mappings")]
    NotAMapping,
    /// An entity's definition is not a mapping.
    #[error("entity '{0}' must be a mapping of field names to descriptors")]
    EntityNotAMapping(String),
    /// Entity or field name is not a plain identifier.
    #[error("invalid name '{0}': must start with a letter or underscore and contain only alphanumerics and underscores")]
    InvalidName(String),
    /// A user schema declares a column the engine manages itself.
    #[error("field '{field}' on '{entity}' is reserved")]
    ReservedField { entity: String, field: String },
    /// Field descriptor has an unsupported shape.
    #[error("invalid descriptor for '{entity}.{field}': {reason}")]
    InvalidField {
        entity: String,
        field: String,
        reason: String,
    },
    /// Unknown `$` directive.
    #[error("unknown directive '{directive}' on '{entity}'")]
    UnknownDirective { entity: String, directive: String },
    /// A reference names an entity that is not declared.
    #[error("'{entity}.{field}' references undeclared entity '{target}'")]
    UnresolvedReference {
        entity: String,
        field: String,
        target: String,
    },
    /// Two entities (or an entity and an association table) map to the same table.
    #[error("table name collision: '{0}'")]
    DuplicateTable(String),
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Validates that a name is usable unquoted as an SQL identifier.
///
/// The name must be non-empty, start with an ASCII letter or underscore, and
/// contain only ASCII alphanumerics and underscores.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validates a user-declared field name: an identifier that is not reserved.
pub(crate) fn validate_field_name(entity: &str, field: &str) -> Result<()> {
    validate_identifier(field)?;
    if field.eq_ignore_ascii_case(IDX_COLUMN) || field.eq_ignore_ascii_case(RIDX_COLUMN) {
        return Err(SchemaError::ReservedField {
            entity: entity.to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("Cred").is_ok());
        assert!(validate_identifier("_t0").is_ok());
        assert!(validate_identifier("game_model2").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("hello world").is_err());
        assert!(validate_identifier("drop;--").is_err());
        assert!(validate_identifier("naïve").is_err());
    }

    #[test]
    fn test_reserved_field_names() {
        assert!(matches!(
            validate_field_name("Cred", "idx"),
            Err(SchemaError::ReservedField { .. })
        ));
        assert!(matches!(
            validate_field_name("Cred", "RIDX"),
            Err(SchemaError::ReservedField { .. })
        ));
        assert!(validate_field_name("Cred", "index").is_ok());
    }

    #[test]
    fn test_error_display_names_location() {
        let err = SchemaError::UnresolvedReference {
            entity: "Cred".into(),
            field: "game".into(),
            target: "Game".into(),
        };
        assert_eq!(
            err.to_string(),
            "'Cred.game' references undeclared entity 'Game'"
        );
    }
}
