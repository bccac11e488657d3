use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::query::{self, SqlQuery};

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row, columns in table/select order.
pub type Row = Vec<Value>;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(_) => Value::Text(value.as_str()?.to_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Insertion-ordered column to value mapping.
///
/// Serves both as a condition set (`a=? AND b=?`) and as an assignment set
/// (`SET a=?, b=?`). Clause order follows insertion order; setting a column
/// twice replaces the earlier value in place.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.values.iter_mut().find(|(column, _)| column.as_str() == name) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(column, _)| column.as_str() == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            let name: String = name.into();
            params.insert(&name, value);
        }
        params
    }
}

/// Table layout used by [`QueryHelper::create_table`]. Not retained after
/// the table is created.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    /// `(column name, type and constraints)` in declaration order.
    pub columns: Vec<(String, String)>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Declare a column, e.g. `column("ID", "text NOT NULL PRIMARY KEY")`.
    pub fn column(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.columns.push((name.into(), definition.into()));
        self
    }

    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FOREIGN KEY({}) REFERENCES {}({})",
            self.column, self.foreign_table, self.foreign_column
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// SQLite helper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Create the database file on first open if it does not exist.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
    /// Enforce foreign keys (`PRAGMA foreign_keys`) on every connection.
    #[serde(default = "default_true")]
    pub enforce_foreign_keys: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    /// Create a new SQLite config with default connection settings
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            create_if_missing: true,
            enforce_foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

/// Serialized access to one SQLite database.
///
/// Every operation takes the helper's lock, opens a fresh connection, runs a
/// single statement, commits, closes the connection and only then releases
/// the lock. Row changes run in an explicit transaction; other statements
/// rely on SQLite's per-statement autocommit. Reads and writes queue behind
/// the same lock.
///
/// The lock belongs to this instance. Two helpers pointed at the same file do
/// not coordinate with each other, so share one helper (e.g. behind an
/// `Arc`) between threads.
#[derive(Debug)]
pub struct QueryHelper {
    config: SqliteConfig,
    lock: Mutex<()>,
}

impl QueryHelper {
    /// Create a helper for `db_path` with default connection settings.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_config(SqliteConfig::new(db_path))
    }

    pub fn with_config(config: SqliteConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Create `table`. With `fail_if_exists == false` an existing table is
    /// left untouched and the call succeeds.
    pub fn create_table(&self, table: &TableDefinition, fail_if_exists: bool) -> Result<()> {
        let query = query::create_table(table, fail_if_exists)?;
        self.execute(&query)
            .map_err(|err| err.reclassify("already exists", SqliteError::SchemaConflict))?;
        info!(table = %table.name, "table ensured");
        Ok(())
    }

    /// Insert one row. `values` must follow the table's column order.
    pub fn insert_row(&self, table_name: &str, values: &[Value]) -> Result<()> {
        let query = query::insert(table_name, values)?;
        self.execute(&query)
            .map_err(|err| err.reclassify("values were supplied", SqliteError::MalformedRequest))?;
        Ok(())
    }

    /// `columns` is `*` or a comma separated column list, used verbatim.
    pub fn select(
        &self,
        columns: &str,
        table_name: &str,
        conditions: Option<&Params>,
    ) -> Result<Vec<Row>> {
        let query = query::select(columns, table_name, conditions)?;
        self.execute(&query)
    }

    pub fn update(
        &self,
        table_name: &str,
        assignments: &Params,
        conditions: Option<&Params>,
    ) -> Result<()> {
        let query = query::update(table_name, assignments, conditions)?;
        self.execute(&query)?;
        Ok(())
    }

    /// Delete matching rows. No conditions deletes every row in the table.
    pub fn delete(&self, table_name: &str, conditions: Option<&Params>) -> Result<()> {
        let query = query::delete(table_name, conditions)?;
        self.execute(&query)?;
        Ok(())
    }

    pub fn drop_table(&self, table_name: &str, fail_if_not_exists: bool) -> Result<()> {
        let query = query::drop_table(table_name, fail_if_not_exists)?;
        self.execute(&query)
            .map_err(|err| err.reclassify("no such table", SqliteError::SchemaConflict))?;
        info!(table = table_name, "table dropped");
        Ok(())
    }

    pub fn execute(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        self.execute_raw(&query.statement, &query.params)
    }

    /// Run one statement with positional `params` and return every row it
    /// produced. Failures roll the statement back and are returned as is.
    pub fn execute_raw(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        // Guards no data, so a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(statement, params = params.len(), "executing statement");

        let conn = self.open()?;
        let rows = run_statement(&conn, statement, params)?;
        conn.close().map_err(|(_, err)| SqliteError::from(err))?;
        Ok(rows)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(&self.config.db_path, self.config.open_flags())?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        // Set both ways: the bundled build enforces foreign keys by default.
        // Must run outside a transaction.
        let foreign_keys = if self.config.enforce_foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
        Ok(conn)
    }
}

/// Whether `statement` modifies rows and so gets an explicit transaction.
/// Queries, DDL, `PRAGMA` and `VACUUM` run in autocommit mode; some of them
/// are refused inside a transaction.
fn is_data_change(statement: &str) -> bool {
    let keyword = statement
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default();
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|dml| keyword.eq_ignore_ascii_case(dml))
}

fn run_statement(conn: &Connection, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
    if !is_data_change(statement) {
        return collect_rows(conn, statement, params);
    }
    let tx = conn.unchecked_transaction()?;
    let rows = collect_rows(&tx, statement, params)?;
    tx.commit()?;
    Ok(rows)
}

fn collect_rows(conn: &Connection, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(statement)?;
    let column_count = stmt.column_count();
    let mut cursor = stmt.query(params_from_iter(params))?;
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        let values = (0..column_count)
            .map(|idx| row.get::<_, Value>(idx))
            .collect::<rusqlite::Result<Row>>()?;
        rows.push(values);
    }
    Ok(rows)
}
