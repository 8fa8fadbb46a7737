//! # Sync Database
//!
//! Opens the SQLite file that holds the queue snapshot.
//!
//! ```text
//! DbConfig::new(path) ──▶ Database::open ──▶ WAL + synchronous=FULL
//!                                         ──▶ busy_timeout (app and the
//!                                             sync-queue CLI may share a file)
//!                                         ──▶ migrations
//!                                         ──▶ sync_queue() repository
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::sync_queue::SyncQueueRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the sync database lives and how long to wait on a locked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// How long a statement waits for another process's write lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// A private in-memory database (for tests and ephemeral sessions).
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to an opened, migrated sync database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database, creating the file if needed, and applies
    /// pending migrations.
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening sync database");

        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::Open(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            // Each save replaces the whole queue
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        // Every connection to ":memory:" is its own database
        let max_connections = if config.is_in_memory() { 1 } else { 2 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Open(e.to_string()))?;

        migrations::run_migrations(&pool).await?;
        Ok(Database { pool })
    }

    /// Repository for the pending queue snapshot.
    pub fn sync_queue(&self) -> SyncQueueRepository {
        SyncQueueRepository::new(self.pool.clone())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_config() {
        let config = DbConfig::in_memory();
        assert!(config.is_in_memory());
        assert!(!DbConfig::new("/tmp/queue.db").is_in_memory());
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let db = Database::open(DbConfig::new(&path)).await.unwrap();
        db.sync_queue().save_queue("[]").await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_saved_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let first = Database::open(DbConfig::new(&path)).await.unwrap();
        first.sync_queue().save_queue("[1]").await.unwrap();
        first.pool().close().await;

        let second = Database::open(DbConfig::new(&path)).await.unwrap();
        assert_eq!(
            second.sync_queue().load_queue().await.unwrap().as_deref(),
            Some("[1]")
        );
    }
}
