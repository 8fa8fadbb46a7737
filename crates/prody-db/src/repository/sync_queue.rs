//! # Sync Queue Repository
//!
//! Persists the pending operation queue as a single JSON document.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         sync_store table                                │
//! │                                                                         │
//! │  key                               │ value            │ updated_at      │
//! │  ──────────────────────────────────┼──────────────────┼──────────────── │
//! │  pending_sync_operations           │ [ {op}, {op} ]   │ 2026-…          │
//! │  pending_sync_operations.corrupt   │ <unparseable>    │ 2026-…          │
//! │                                                                         │
//! │  save_queue   → UPSERT the whole array (one statement, atomic)         │
//! │  load_queue   → SELECT value, None when the key was never written      │
//! │  quarantine   → move value to the .corrupt key (one transaction)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The repository doesn't know the JSON shape. Parsing and validation
//! live in prody-sync so both store backends behave the same way.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use prody_core::PENDING_QUEUE_KEY;

/// Suffix for the key that holds a queue document we failed to parse.
pub const QUARANTINE_SUFFIX: &str = ".corrupt";

/// Repository for the persisted sync queue.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
    key: String,
}

impl SyncQueueRepository {
    /// Creates a repository bound to the `pending_sync_operations` key.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository {
            pool,
            key: PENDING_QUEUE_KEY.to_string(),
        }
    }

    fn quarantine_key(&self) -> String {
        format!("{}{}", self.key, QUARANTINE_SUFFIX)
    }

    /// Replaces the stored queue document.
    ///
    /// A single UPSERT, so readers see either the previous document or
    /// this one.
    pub async fn save_queue(&self, json: &str) -> DbResult<()> {
        debug!(key = %self.key, bytes = json.len(), "Saving sync queue");

        sqlx::query(
            r#"
            INSERT INTO sync_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.key)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads the stored queue document.
    ///
    /// ## Returns
    /// `None` if nothing was ever saved (or the queue was cleared).
    pub async fn load_queue(&self) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_store WHERE key = ?1")
                .bind(&self.key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Removes the stored queue document.
    pub async fn clear_queue(&self) -> DbResult<()> {
        debug!(key = %self.key, "Clearing sync queue");

        sqlx::query("DELETE FROM sync_store WHERE key = ?1")
            .bind(&self.key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Moves an unparseable queue document aside.
    ///
    /// Copies `raw` under the quarantine key and deletes the live key in
    /// one transaction, so the next load starts from an empty queue while
    /// the bad bytes stay available for diagnosis. A previous quarantined
    /// document is overwritten.
    pub async fn quarantine_queue(&self, raw: &str) -> DbResult<()> {
        let quarantine_key = self.quarantine_key();
        warn!(
            key = %self.key,
            quarantine_key = %quarantine_key,
            bytes = raw.len(),
            "Quarantining corrupt sync queue"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sync_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&quarantine_key)
        .bind(raw)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sync_store WHERE key = ?1")
            .bind(&self.key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns the quarantined document, if any.
    pub async fn load_quarantined(&self) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_store WHERE key = ?1")
                .bind(self.quarantine_key())
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// When the queue was last written.
    pub async fn last_saved_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let value: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT updated_at FROM sync_store WHERE key = ?1")
                .bind(&self.key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::open(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_empty_returns_none() {
        let db = db().await;
        assert_eq!(db.sync_queue().load_queue().await.unwrap(), None);
        assert_eq!(db.sync_queue().last_saved_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_document() {
        let db = db().await;
        let repo = db.sync_queue();

        repo.save_queue(r#"[{"id":"a"}]"#).await.unwrap();
        repo.save_queue(r#"[{"id":"b"}]"#).await.unwrap();

        assert_eq!(
            repo.load_queue().await.unwrap().as_deref(),
            Some(r#"[{"id":"b"}]"#)
        );
        assert!(repo.last_saved_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_document() {
        let db = db().await;
        let repo = db.sync_queue();

        repo.save_queue("[]").await.unwrap();
        repo.clear_queue().await.unwrap();

        assert_eq!(repo.load_queue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quarantine_moves_raw_bytes_aside() {
        let db = db().await;
        let repo = db.sync_queue();

        repo.save_queue("{not json").await.unwrap();
        repo.quarantine_queue("{not json").await.unwrap();

        assert_eq!(repo.load_queue().await.unwrap(), None);
        assert_eq!(
            repo.load_quarantined().await.unwrap().as_deref(),
            Some("{not json")
        );
    }
}
