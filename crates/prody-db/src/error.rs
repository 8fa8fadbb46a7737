//! # Database Error Types
//!
//! ```text
//! sqlx::Error / MigrateError ──▶ DbError ──▶ SyncError::StorageFailed (prody-sync)
//! ```
//! The engine logs storage failures and keeps its in-memory queue.

use thiserror::Error;

/// SQLite error code for a database locked by another connection.
const SQLITE_BUSY: &str = "5";

#[derive(Debug, Error)]
pub enum DbError {
    /// The file couldn't be opened or created.
    #[error("Could not open sync database: {0}")]
    Open(String),

    #[error("Sync database migration failed: {0}")]
    Migration(String),

    /// Another process held the write lock past the busy timeout.
    #[error("Sync database is busy")]
    Busy,

    #[error("Sync database query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(SQLITE_BUSY) => {
                DbError::Busy
            }
            sqlx::Error::PoolTimedOut => DbError::Busy,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Configuration(_) => {
                DbError::Open(err.to_string())
            }
            _ => DbError::Query(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_errors_map() {
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::Busy));
        assert!(matches!(DbError::from(sqlx::Error::PoolClosed), DbError::Open(_)));
        assert!(matches!(DbError::from(sqlx::Error::RowNotFound), DbError::Query(_)));
    }
}
