//! Store configuration.
//!
//! Defines the YAML-serializable settings applied when a factory opens its
//! SQLite connection. Every field has a default, so a partial file (or no
//! file at all) is valid.
//!
//! # Example YAML
//!
//! ```yaml
//! path: data/app.db
//! journal_mode: WAL
//! foreign_keys: true
//! atomic: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Journal mode applied at connection open when none is configured.
pub const DEFAULT_JOURNAL_MODE: &str = "WAL";

/// Connection-scoped settings for a store.
///
/// # Examples
///
/// ```
/// use sqlreflect_db::StoreConfig;
///
/// let config = StoreConfig::in_memory();
/// assert!(config.path.is_none());
/// assert!(config.foreign_keys);
/// assert!(config.atomic);
///
/// let config = StoreConfig::at("app.db");
/// assert_eq!(config.path.as_deref(), Some(std::path::Path::new("app.db")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Value for `PRAGMA journal_mode`.
    pub journal_mode: String,
    /// Whether to enable `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// Wrap lifecycle operations (nested construction, cascading delete,
    /// array replacement) in savepoints.
    pub atomic: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: DEFAULT_JOURNAL_MODE.to_string(),
            foreign_keys: true,
            atomic: true,
        }
    }
}

impl StoreConfig {
    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a database file at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::LoadError::IoError) if the file cannot be
    /// read, or [`YamlError`](crate::LoadError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::LoadError::IoError) if the file cannot be
    /// written, or [`YamlError`](crate::LoadError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Human-readable location, used in logs and error messages.
    pub fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }
}
