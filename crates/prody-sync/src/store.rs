//! # Operation Store
//!
//! Durable persistence for the full pending-operation set.
//!
//! ## Snapshot Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Whole-Queue Snapshots                                │
//! │                                                                         │
//! │  in-memory queue (authoritative)                                       │
//! │       │                                                                 │
//! │       │  save(&[SyncOperation])  ← after every mutation                │
//! │       ▼                                                                 │
//! │  JSON array of SyncOperation (camelCase)                               │
//! │       │                                                                 │
//! │       ├── SqliteOperationStore  → sync_store["pending_sync_operations"]│
//! │       ├── FileOperationStore    → tmp file, fsync, rename              │
//! │       └── MemoryOperationStore  → String in process memory             │
//! │                                                                         │
//! │  Every save replaces the previous snapshot atomically: a reader sees   │
//! │  the old queue or the new one, never a mix.                            │
//! │                                                                         │
//! │  load() on unparseable bytes:                                          │
//! │    1. move the bytes aside (*.corrupt)                                 │
//! │    2. return SyncError::CorruptQueue                                   │
//! │    3. the engine starts empty and reports the problem once             │
//! │                                                                         │
//! │  peek() decodes the same bytes but never moves anything, so tools can  │
//! │  inspect a queue a running app still owns.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use prody_core::SyncOperation;
use prody_db::{Database, DbConfig, SyncQueueRepository};

use crate::config::{StorageBackend, SyncConfig};
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Store Trait
// =============================================================================

/// Persists the pending queue as one snapshot.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Replaces the persisted queue with `operations`.
    async fn save(&self, operations: &[SyncOperation]) -> SyncResult<()>;

    /// Returns the last saved queue, empty if nothing was saved.
    ///
    /// ## Errors
    /// `SyncError::CorruptQueue` if a snapshot exists but can't be decoded.
    async fn load(&self) -> SyncResult<Vec<SyncOperation>>;

    /// Removes the persisted queue.
    async fn clear(&self) -> SyncResult<()>;

    /// Decodes the persisted queue without side effects.
    ///
    /// Unlike [`load`](Self::load), a corrupt snapshot is reported as
    /// `SyncError::CorruptQueue` and left where it is.
    async fn peek(&self) -> SyncResult<Vec<SyncOperation>>;

    /// When the snapshot was last written, if the backend records it.
    async fn saved_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

#[async_trait]
impl<T: OperationStore + ?Sized> OperationStore for Arc<T> {
    async fn save(&self, operations: &[SyncOperation]) -> SyncResult<()> {
        (**self).save(operations).await
    }

    async fn load(&self) -> SyncResult<Vec<SyncOperation>> {
        (**self).load().await
    }

    async fn clear(&self) -> SyncResult<()> {
        (**self).clear().await
    }

    async fn peek(&self) -> SyncResult<Vec<SyncOperation>> {
        (**self).peek().await
    }

    async fn saved_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        (**self).saved_at().await
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Serializes a queue snapshot.
pub fn encode_queue(operations: &[SyncOperation]) -> SyncResult<String> {
    Ok(serde_json::to_string(operations)?)
}

/// Parses a queue snapshot. Blank input is an empty queue.
pub fn decode_queue(raw: &str) -> SyncResult<Vec<SyncOperation>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| SyncError::CorruptQueue(e.to_string()))
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// Stores the queue as a single row in the SQLite `sync_store` table.
#[derive(Debug)]
pub struct SqliteOperationStore {
    repo: SyncQueueRepository,
    write_lock: Mutex<()>,
}

impl SqliteOperationStore {
    pub fn new(repo: SyncQueueRepository) -> Self {
        SqliteOperationStore {
            repo,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens (or creates) the database at `path` and runs migrations.
    pub async fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let db = Database::open(DbConfig::new(path)).await?;
        Ok(Self::new(db.sync_queue()))
    }

    /// In-memory database, mostly for tests.
    pub async fn in_memory() -> SyncResult<Self> {
        let db = Database::open(DbConfig::in_memory()).await?;
        Ok(Self::new(db.sync_queue()))
    }

    pub fn repository(&self) -> &SyncQueueRepository {
        &self.repo
    }
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn save(&self, operations: &[SyncOperation]) -> SyncResult<()> {
        let json = encode_queue(operations)?;
        let _guard = self.write_lock.lock().await;
        self.repo.save_queue(&json).await?;
        debug!(count = operations.len(), "Persisted sync queue to SQLite");
        Ok(())
    }

    async fn load(&self) -> SyncResult<Vec<SyncOperation>> {
        let _guard = self.write_lock.lock().await;
        let Some(raw) = self.repo.load_queue().await? else {
            return Ok(Vec::new());
        };

        match decode_queue(&raw) {
            Ok(operations) => Ok(operations),
            Err(err) => {
                self.repo.quarantine_queue(&raw).await?;
                Err(err)
            }
        }
    }

    async fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        self.repo.clear_queue().await?;
        Ok(())
    }

    async fn peek(&self) -> SyncResult<Vec<SyncOperation>> {
        match self.repo.load_queue().await? {
            Some(raw) => decode_queue(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn saved_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.repo.last_saved_at().await?)
    }
}

// =============================================================================
// File Backend
// =============================================================================

/// Stores the queue as a JSON file, replaced by write-then-rename.
#[derive(Debug)]
pub struct FileOperationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileOperationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileOperationStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "pending_sync_operations".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Where a corrupt snapshot is moved on load.
    pub fn quarantine_path(&self) -> PathBuf {
        self.sibling(".corrupt")
    }

    async fn write_atomically(&self, contents: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.sibling(".tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await
    }

    async fn read_raw(&self) -> SyncResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> SyncError {
    SyncError::StorageFailed(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl OperationStore for FileOperationStore {
    async fn save(&self, operations: &[SyncOperation]) -> SyncResult<()> {
        let json = encode_queue(operations)?;
        let _guard = self.write_lock.lock().await;
        self.write_atomically(&json)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        debug!(count = operations.len(), path = %self.path.display(), "Persisted sync queue to file");
        Ok(())
    }

    async fn load(&self) -> SyncResult<Vec<SyncOperation>> {
        let _guard = self.write_lock.lock().await;
        let Some(raw) = self.read_raw().await? else {
            return Ok(Vec::new());
        };

        match decode_queue(&raw) {
            Ok(operations) => Ok(operations),
            Err(err) => {
                let quarantine = self.quarantine_path();
                warn!(
                    path = %self.path.display(),
                    quarantine = %quarantine.display(),
                    "Quarantining corrupt sync queue file"
                );
                tokio::fs::rename(&self.path, &quarantine)
                    .await
                    .map_err(|e| io_error(&self.path, e))?;
                Err(err)
            }
        }
    }

    async fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    async fn peek(&self) -> SyncResult<Vec<SyncOperation>> {
        match self.read_raw().await? {
            Some(raw) => decode_queue(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn saved_at(&self) -> SyncResult<Option<DateTime<Utc>>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.modified().ok().map(DateTime::<Utc>::from)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

/// Keeps the snapshot in process memory.
///
/// Clones share the same snapshot. Still round-trips through JSON so the
/// encoding is exercised the same way as on disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryOperationStore {
    inner: Arc<MemoryInner>,
}

impl MemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `raw` as the persisted snapshot.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        MemoryOperationStore {
            inner: Arc::new(MemoryInner {
                snapshot: Mutex::new(Some(raw.into())),
                ..MemoryInner::default()
            }),
        }
    }

    /// Makes subsequent saves and clears fail until turned off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Current raw snapshot.
    pub async fn raw(&self) -> Option<String> {
        self.inner.snapshot.lock().await.clone()
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::StorageFailed("memory store write disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn save(&self, operations: &[SyncOperation]) -> SyncResult<()> {
        self.check_writable()?;
        let json = encode_queue(operations)?;
        *self.inner.snapshot.lock().await = Some(json);
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> SyncResult<Vec<SyncOperation>> {
        let mut snapshot = self.inner.snapshot.lock().await;
        let Some(raw) = snapshot.as_deref() else {
            return Ok(Vec::new());
        };
        match decode_queue(raw) {
            Ok(operations) => Ok(operations),
            Err(err) => {
                *snapshot = None;
                Err(err)
            }
        }
    }

    async fn clear(&self) -> SyncResult<()> {
        self.check_writable()?;
        *self.inner.snapshot.lock().await = None;
        Ok(())
    }

    async fn peek(&self) -> SyncResult<Vec<SyncOperation>> {
        match self.inner.snapshot.lock().await.as_deref() {
            Some(raw) => decode_queue(raw),
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// Construction from Config
// =============================================================================

/// Opens the store selected by `config.storage`.
pub async fn open_store(config: &SyncConfig) -> SyncResult<Arc<dyn OperationStore>> {
    let backend = config.storage.backend;
    let store: Arc<dyn OperationStore> = match backend {
        StorageBackend::Memory => Arc::new(MemoryOperationStore::new()),
        StorageBackend::Sqlite | StorageBackend::File => {
            let path = config.storage_path().ok_or_else(|| {
                SyncError::InvalidConfig("No storage path configured or derivable".into())
            })?;
            info!(%backend, path = %path.display(), "Opening sync queue store");
            if backend == StorageBackend::Sqlite {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| io_error(parent, e))?;
                    }
                }
                Arc::new(SqliteOperationStore::open(path).await?)
            } else {
                Arc::new(FileOperationStore::new(path))
            }
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prody_core::{LifecycleState, OperationType};

    fn sample_queue() -> Vec<SyncOperation> {
        let mut retrying = SyncOperation::new(OperationType::JournalUpdate, Some("j-1".into()), "{\"id\":1}", 5);
        retrying.lifecycle_state = LifecycleState::RetryScheduled;
        retrying.attempt_count = 2;
        retrying.last_error = Some("timeout".into());
        vec![
            SyncOperation::new(OperationType::JournalCreate, None, "{}", 1),
            retrying,
        ]
    }

    #[test]
    fn test_snapshot_uses_camel_case_fields() {
        let json = encode_queue(&sample_queue()).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"type\":\"JOURNAL_CREATE\""));
        assert!(json.contains("\"idempotencyKey\""));
        assert!(json.contains("\"lifecycleState\":\"RETRY_SCHEDULED\""));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_queue("").unwrap().is_empty());
        assert!(matches!(decode_queue("{oops"), Err(SyncError::CorruptQueue(_))));
        assert!(matches!(decode_queue("{\"id\":1}"), Err(SyncError::CorruptQueue(_))));
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteOperationStore::in_memory().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());

        let queue = sample_queue();
        store.save(&queue).await.unwrap();
        assert_eq!(store.load().await.unwrap(), queue);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_store_quarantines_corrupt_row() {
        let store = SqliteOperationStore::in_memory().await.unwrap();
        store.repository().save_queue("not json").await.unwrap();

        assert!(matches!(store.load().await, Err(SyncError::CorruptQueue(_))));
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(
            store.repository().load_quarantined().await.unwrap().as_deref(),
            Some("not json")
        );
    }

    #[tokio::test]
    async fn test_sqlite_peek_leaves_corrupt_row_in_place() {
        let store = SqliteOperationStore::in_memory().await.unwrap();
        assert_eq!(store.saved_at().await.unwrap(), None);
        store.repository().save_queue("not json").await.unwrap();

        assert!(matches!(store.peek().await, Err(SyncError::CorruptQueue(_))));
        assert_eq!(
            store.repository().load_queue().await.unwrap().as_deref(),
            Some("not json")
        );
        assert_eq!(store.repository().load_quarantined().await.unwrap(), None);
        assert!(store.saved_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOperationStore::new(dir.path().join("nested").join("queue.json"));

        assert!(store.load().await.unwrap().is_empty());

        let queue = sample_queue();
        store.save(&queue).await.unwrap();
        assert_eq!(store.load().await.unwrap(), queue);

        // The temp file never outlives a save
        assert!(!dir.path().join("nested").join("queue.json.tmp").exists());

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_quarantines_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "[{\"id\":").unwrap();

        let store = FileOperationStore::new(&path);
        assert!(matches!(store.load().await, Err(SyncError::CorruptQueue(_))));

        assert!(!path.exists());
        assert_eq!(
            std::fs::read_to_string(store.quarantine_path()).unwrap(),
            "[{\"id\":"
        );
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_peek_leaves_corrupt_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let store = FileOperationStore::new(&path);
        assert_eq!(store.saved_at().await.unwrap(), None);

        std::fs::write(&path, "[{\"id\":").unwrap();

        assert!(matches!(store.peek().await, Err(SyncError::CorruptQueue(_))));
        assert!(path.exists());
        assert!(!store.quarantine_path().exists());
        assert!(store.saved_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryOperationStore::new();
        let queue = sample_queue();

        store.save(&queue).await.unwrap();
        store.set_fail_writes(true);
        assert!(store.save(&[]).await.unwrap_err().is_storage_error());

        // Failed write left the previous snapshot alone
        assert_eq!(store.load().await.unwrap(), queue);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_open_store_memory_backend() {
        let mut config = SyncConfig::default();
        config.storage.backend = StorageBackend::Memory;

        let store = open_store(&config).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_store_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::default();
        config.storage.path = Some(dir.path().join("data").join("sync.db"));

        let store = open_store(&config).await.unwrap();
        store.save(&sample_queue()).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);
    }
}
