//! Raw schema loading from JSON and YAML definition files.
//!
//! Provides [`RawSchema`], the un-normalized entity mapping, and
//! [`SchemaLoader`] for merging several definition files into one.
//!
//! # Loading patterns
//!
//! ```no_run
//! use sqlreflect_db::{RawSchema, SchemaLoader};
//!
//! // A single file; the format follows the extension
//! let raw = RawSchema::from_file("schema/app.yaml").unwrap();
//!
//! // Every *.json / *.yaml / *.yml file in a directory, in file-name order
//! let raw = RawSchema::from_dir("schema/").unwrap();
//!
//! // Several sources merged in order
//! let raw = SchemaLoader::new()
//!     .file("schema/core.json")
//!     .dir("schema/plugins/")
//!     .build()
//!     .unwrap();
//! let schema = raw.normalize().unwrap();
//! ```

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use sqlreflect_core::Schema;
use tracing::debug;

use crate::error::{LoadError, Result};

/// Describes where a [`RawSchema`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// Parsed from an in-memory string.
    Inline,
    /// Loaded from a single definition file.
    File(PathBuf),
    /// Loaded from every definition file in a directory.
    Directory(PathBuf),
}

/// Un-normalized schema: entity name → raw field mapping, in declaration order.
///
/// # Examples
///
/// ```
/// use sqlreflect_db::RawSchema;
///
/// let raw = RawSchema::from_yaml_str("
/// Game:
///   name: TEXT
/// Cred:
///   username: TEXT
///   game: '@Game'
/// ").unwrap();
///
/// assert_eq!(raw.entity_names().collect::<Vec<_>>(), vec!["Game", "Cred"]);
/// let schema = raw.normalize().unwrap();
/// assert!(schema.contains("Cred"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RawSchema {
    entities: Map<String, Value>,
    sources: Vec<SchemaSource>,
}

impl RawSchema {
    /// Wraps an already-parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidDocument`] if the document is not a mapping.
    pub fn from_value(document: Value) -> Result<Self> {
        Self::from_document(document, SchemaSource::Inline)
    }

    /// Parses a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_value(serde_yaml::from_str(text)?)
    }

    /// Loads a single definition file, choosing the parser by extension.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedFormat`] for extensions other than
    /// `json`, `yaml`, and `yml`, and I/O or parse errors otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::of(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;
        let text = std::fs::read_to_string(path)?;
        let document: Value = match format {
            Format::Json => serde_json::from_str(&text)?,
            Format::Yaml => serde_yaml::from_str(&text)?,
        };
        debug!(path = %path.display(), "loaded schema definition file");
        Self::from_document(document, SchemaSource::File(path.to_path_buf()))
    }

    /// Loads and merges every definition file in a directory.
    ///
    /// Files are visited in file-name order; files with other extensions are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DuplicateEntity`] if two files declare the same
    /// entity, and I/O or parse errors otherwise.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() && Format::of(&file_path).is_some() {
                files.push(file_path);
            }
        }
        files.sort();

        let mut merged = Self::default();
        for file in files {
            merged.merge(Self::from_file(file)?)?;
        }
        merged.sources = vec![SchemaSource::Directory(path.to_path_buf())];
        Ok(merged)
    }

    fn from_document(document: Value, source: SchemaSource) -> Result<Self> {
        match document {
            Value::Object(entities) => Ok(Self {
                entities,
                sources: vec![source],
            }),
            // An empty YAML file parses as null.
            Value::Null => Ok(Self {
                entities: Map::new(),
                sources: vec![source],
            }),
            other => Err(LoadError::InvalidDocument(format!(
                "expected a mapping of entity names, found {}",
                kind_name(&other)
            ))),
        }
    }

    /// Appends the entities of `other`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DuplicateEntity`] if an entity is already present;
    /// `self` is left unchanged in that case.
    pub fn merge(&mut self, other: RawSchema) -> Result<()> {
        if let Some(duplicate) = other.entities.keys().find(|k| self.entities.contains_key(*k)) {
            return Err(LoadError::DuplicateEntity(duplicate.clone()));
        }
        self.entities.extend(other.entities);
        self.sources.extend(other.sources);
        Ok(())
    }

    /// Normalizes the loaded definitions.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::SchemaError`] if normalization rejects the schema.
    pub fn normalize(&self) -> Result<Schema> {
        Ok(sqlreflect_core::normalize(&self.as_value())?)
    }

    /// Returns the document as a JSON value.
    pub fn as_value(&self) -> Value {
        Value::Object(self.entities.clone())
    }

    /// Iterates declared entity names in declaration order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Number of declared entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entities are declared.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns where the definitions came from.
    pub fn sources(&self) -> &[SchemaSource] {
        &self.sources
    }
}

/// Supported definition file formats.
#[derive(Debug, Clone, Copy)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Builder merging several schema sources in the order they are added.
///
/// # Example
///
/// ```no_run
/// use sqlreflect_db::SchemaLoader;
///
/// let raw = SchemaLoader::new()
///     .file("schema/users.yaml")
///     .file("schema/games.json")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct SchemaLoader {
    sources: Vec<SchemaSource>,
}

impl SchemaLoader {
    /// Creates a loader with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SchemaSource::File(path.into()));
        self
    }

    /// Adds a directory of definition files.
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SchemaSource::Directory(path.into()));
        self
    }

    /// Adds a file or a directory, whichever `path` is.
    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() { self.dir(path) } else { self.file(path) }
    }

    /// Loads and merges every source.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NoSources`] if nothing was added, otherwise the
    /// first load or merge error.
    pub fn build(self) -> Result<RawSchema> {
        if self.sources.is_empty() {
            return Err(LoadError::NoSources);
        }
        let mut merged = RawSchema::default();
        for source in self.sources {
            let loaded = match source {
                SchemaSource::File(path) => RawSchema::from_file(path)?,
                SchemaSource::Directory(path) => RawSchema::from_dir(path)?,
                SchemaSource::Inline => continue,
            };
            merged.merge(loaded)?;
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str_keeps_declaration_order() {
        let raw = RawSchema::from_json_str(r#"{"Zed": {}, "Alpha": {}, "Mid": {}}"#).unwrap();
        let names: Vec<_> = raw.entity_names().collect();
        assert_eq!(names, vec!["Zed", "Alpha", "Mid"]);
        assert_eq!(raw.sources(), &[SchemaSource::Inline]);
    }

    #[test]
    fn test_rejects_non_mapping_document() {
        assert!(matches!(
            RawSchema::from_json_str("[1, 2]"),
            Err(LoadError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_null_yaml_is_empty_schema() {
        let raw = RawSchema::from_yaml_str("~\n").unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn test_merge_rejects_duplicates() {
        let mut a = RawSchema::from_json_str(r#"{"Cred": {}}"#).unwrap();
        let b = RawSchema::from_json_str(r#"{"Cred": {}, "Game": {}}"#).unwrap();
        assert!(matches!(a.merge(b), Err(LoadError::DuplicateEntity(name)) if name == "Cred"));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            RawSchema::from_file("schema.toml"),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_loader_without_sources() {
        assert!(matches!(SchemaLoader::new().build(), Err(LoadError::NoSources)));
    }

    #[test]
    fn test_normalize_surfaces_schema_errors() {
        let raw = RawSchema::from_json_str(r#"{"Cred": {"game": "@Game"}}"#).unwrap();
        assert!(matches!(raw.normalize(), Err(LoadError::SchemaError(_))));
    }
}
