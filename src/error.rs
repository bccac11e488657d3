use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors returned by [`crate::QueryHelper`].
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Creating a table that already exists, or dropping one that does not.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    /// Primary key, foreign key, NOT NULL or UNIQUE violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    /// The caller supplied arguments that cannot form a valid statement.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("sqlite error: {0}")]
    Engine(#[source] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SqliteError>;

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            rusqlite::Error::SqlInputError { error, msg, .. }
                if error.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(msg.clone())
            }
            _ => Self::Engine(err),
        }
    }
}

impl SqliteError {
    /// Message SQLite attached to an unclassified engine failure. Errors
    /// raised while preparing a statement carry it in `SqlInputError`.
    pub(crate) fn engine_message(&self) -> Option<&str> {
        match self {
            Self::Engine(rusqlite::Error::SqliteFailure(_, Some(message))) => {
                Some(message.as_str())
            }
            Self::Engine(rusqlite::Error::SqlInputError { msg, .. }) => Some(msg.as_str()),
            _ => None,
        }
    }

    /// Rewrites an engine failure whose message contains `needle` into
    /// another kind. Other errors pass through untouched.
    pub(crate) fn reclassify(self, needle: &str, into: fn(String) -> Self) -> Self {
        if let Some(message) = self.engine_message().filter(|m| m.contains(needle)) {
            return into(message.to_string());
        }
        self
    }
}
