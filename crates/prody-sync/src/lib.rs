//! # prody-sync: Offline-First Sync Engine for Prody
//!
//! This crate keeps locally made changes in a durable queue and delivers
//! them to the remote store whenever the network allows, with retry,
//! exponential backoff and idempotency keys.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  app code ── queue_operation(type, entity, payload, priority)          │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncEngine                               │  │
//! │  │                                                                  │  │
//! │  │  Mutex<Vec<SyncOperation>>  ── save ──▶  OperationStore          │  │
//! │  │        │                                 (SQLite / file / mem)   │  │
//! │  │        │ drain (1 permit)                                        │  │
//! │  │        ▼                                                         │  │
//! │  │  priority desc, created_at asc ──▶ OperationExecutor             │  │
//! │  │        │                           (ExecutorRegistry)            │  │
//! │  │        │ failure                                                 │  │
//! │  │        ▼                                                         │  │
//! │  │  RetryScheduler (2s · 2^n, cap 300s, + jitter)                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  watch<SyncState>    watch<SyncTelemetry>    SyncWorker                │
//! │  (status banner)     (queue health)          (connectivity + timers)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `SyncEngine` queue management and drain passes
//! - [`worker`] - Background task reacting to connectivity and retries
//! - [`store`] - `OperationStore` trait and its backends
//! - [`retry`] - Backoff policy and jitter
//! - [`executor`] - Execution collaborator trait and per-type registry
//! - [`connectivity`] - Connectivity state channel
//! - [`status`] - Status derivation and drain reports
//! - [`clock`] - Wall-clock abstraction
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prody_sync::{open_store, ConnectivityMonitor, ConnectivityState, ExecutorRegistry, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let store = open_store(&config).await?;
//! let monitor = ConnectivityMonitor::new(ConnectivityState::Unavailable);
//! let executors = ExecutorRegistry::new().register_all(api_client);
//!
//! let engine = SyncEngine::builder(store, executors, monitor.subscribe())
//!     .config(config)
//!     .build()
//!     .await?;
//! let worker = engine.start()?;
//!
//! engine.queue_operation(OperationType::JournalCreate, Some(id), json, 5).await;
//! println!("{}", engine.state().status_message());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod executor;
pub mod retry;
pub mod status;
pub mod store;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineSettings, RetrySettings, StorageBackend, StorageSettings, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{ExecutionError, SyncError, SyncResult};
pub use executor::{ExecutionRequest, ExecutorRegistry, OperationExecutor};
pub use retry::{next_retry_delay, RetryPolicy, RetryScheduler};
pub use status::DrainReport;
pub use store::{
    open_store, FileOperationStore, MemoryOperationStore, OperationStore, SqliteOperationStore,
};
pub use worker::SyncWorkerHandle;

pub use prody_core::{
    ConflictResolution, LifecycleState, OperationType, SyncOperation, SyncState, SyncStatus,
    SyncTelemetry,
};
