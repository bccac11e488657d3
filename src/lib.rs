//! Small SQLite helper that serializes every statement through one lock.
//!
//! # Intention
//!
//! - Turn structured requests (table definitions, ordered column/value
//!   mappings) into single SQL statements with positionally bound values.
//! - Run each statement on a fresh connection: open, execute, commit, close.
//! - Surface every engine failure to the caller as a typed [`SqliteError`].
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - Table and column names are interpolated into statements as given. Only
//!   values are bound as parameters, so identifiers must come from trusted
//!   code.

pub mod error;
pub mod query;
pub mod sqlite;

pub use error::{Result, SqliteError};
pub use query::SqlQuery;
pub use sqlite::{ForeignKey, Params, QueryHelper, Row, SqliteConfig, TableDefinition, Value};
