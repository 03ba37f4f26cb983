//! Connection ownership and statement execution.
//!
//! [`Storage`] owns the single SQLite connection of a factory. The connection
//! is opened lazily on first use and configured from a
//! [`StoreConfig`](sqlreflect_db::StoreConfig): journal mode and foreign-key
//! enforcement are applied once, at open time.
//!
//! Every driver failure is wrapped as [`OrmError::Storage`] carrying the SQL
//! text that failed. Statements are logged at `trace` level.

use once_cell::unsync::OnceCell;
use rusqlite::{Connection, params_from_iter};
use sqlreflect_db::StoreConfig;
use tracing::{debug, trace};

use crate::error::{OrmError, Result, storage_error};

/// A dynamically typed SQLite value.
pub type SqlValue = rusqlite::types::Value;

/// One result row: column names paired with their values, in select order.
///
/// # Examples
///
/// ```
/// use sqlreflect_sqlite::{Row, SqlValue};
///
/// let row = Row::new(vec![("idx".into(), SqlValue::Integer(3))]);
/// assert_eq!(row.integer("idx"), Some(3));
/// assert!(row.get("missing").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a row from `(column, value)` pairs.
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Integer value of the named column; `None` for NULL or other types.
    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Some(SqlValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Text value of the named column.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(SqlValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Column names in select order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in select order.
    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Lazily opened connection plus the configuration it was opened with.
pub(crate) struct Storage {
    config: StoreConfig,
    conn: OnceCell<Connection>,
}

impl Storage {
    pub(crate) fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: OnceCell::new(),
        }
    }

    /// Adopts an already-open connection, applying the configured pragmas now.
    pub(crate) fn with_connection(conn: Connection, config: StoreConfig) -> Result<Self> {
        configure(&conn, &config)?;
        Ok(Self {
            config,
            conn: OnceCell::from(conn),
        })
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    pub(crate) fn connection(&self) -> Result<&Connection> {
        self.conn.get_or_try_init(|| self.open())
    }

    fn open(&self) -> Result<Connection> {
        let location = self.config.location();
        let conn = match &self.config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|source| OrmError::Open {
            path: location.clone(),
            source,
        })?;
        configure(&conn, &self.config)?;
        debug!(location = %location, journal_mode = %self.config.journal_mode, "opened store");
        Ok(conn)
    }

    /// Runs a single statement, returning the number of changed rows.
    pub(crate) fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        trace!(sql, ?params, "execute");
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(sql).map_err(|e| storage_error(sql, e))?;
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| storage_error(sql, e))
    }

    /// Runs an `INSERT`, returning the row id it created.
    pub(crate) fn insert(&self, sql: &str, params: &[SqlValue]) -> Result<i64> {
        self.execute(sql, params)?;
        Ok(self.connection()?.last_insert_rowid())
    }

    /// First result row, or `None` when the query matches nothing.
    pub(crate) fn query_row(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.collect(sql, params, Some(1))?.into_iter().next())
    }

    /// Every result row.
    pub(crate) fn query_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.collect(sql, params, None)
    }

    /// First column of every result row, as integers; NULLs are skipped.
    pub(crate) fn query_ids(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<i64>> {
        trace!(sql, ?params, "query");
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(sql).map_err(|e| storage_error(sql, e))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, Option<i64>>(0))
            .map_err(|e| storage_error(sql, e))?;

        let mut ids = Vec::new();
        for id in rows {
            if let Some(id) = id.map_err(|e| storage_error(sql, e))? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Runs one or more `;`-separated statements without parameters.
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        trace!(sql, "execute batch");
        self.connection()?
            .execute_batch(sql)
            .map_err(|e| storage_error(sql, e))
    }

    /// Runs `sql` inside a transaction; nothing is applied if any statement fails.
    pub(crate) fn transaction(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| storage_error("BEGIN", e))?;
        tx.execute_batch(sql).map_err(|e| storage_error(sql, e))?;
        tx.commit().map_err(|e| storage_error("COMMIT", e))
    }

    pub(crate) fn savepoint(&self, name: &str) -> Result<()> {
        self.execute_batch(&format!("SAVEPOINT {name}"))
    }

    pub(crate) fn release(&self, name: &str) -> Result<()> {
        self.execute_batch(&format!("RELEASE {name}"))
    }

    pub(crate) fn rollback_to(&self, name: &str) -> Result<()> {
        self.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
    }

    fn collect(&self, sql: &str, params: &[SqlValue], limit: Option<usize>) -> Result<Vec<Row>> {
        trace!(sql, ?params, "query");
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(sql).map_err(|e| storage_error(sql, e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| storage_error(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| storage_error(sql, e))? {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                let value: SqlValue = row.get(i).map_err(|e| storage_error(sql, e))?;
                columns.push((name.clone(), value));
            }
            out.push(Row::new(columns));
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        Ok(out)
    }
}

const JOURNAL_MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

fn configure(conn: &Connection, config: &StoreConfig) -> Result<()> {
    let location = config.location();
    let open_error = |source| OrmError::Open {
        path: location.clone(),
        source,
    };

    let requested = config.journal_mode.to_ascii_uppercase();
    if !JOURNAL_MODES.contains(&requested.as_str()) {
        return Err(OrmError::InvalidJournalMode(config.journal_mode.clone()));
    }
    let applied: String = conn
        .query_row(&format!("PRAGMA journal_mode = {requested}"), [], |row| row.get(0))
        .map_err(open_error)?;
    trace!(%requested, %applied, "journal mode");

    let foreign_keys = if config.foreign_keys {
        "PRAGMA foreign_keys = ON;"
    } else {
        "PRAGMA foreign_keys = OFF;"
    };
    conn.execute_batch(foreign_keys).map_err(open_error)?;
    Ok(())
}
