//! # Repository Module
//!
//! Database repository implementations for the sync store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SqliteOperationStore (prody-sync)                                     │
//! │       │                                                                 │
//! │       │  db.sync_queue().save_queue(json)                              │
//! │       ▼                                                                 │
//! │  SyncQueueRepository                                                   │
//! │  ├── save_queue(&self, json)                                           │
//! │  ├── load_queue(&self)                                                 │
//! │  ├── clear_queue(&self)                                                │
//! │  └── quarantine_queue(&self, raw)                                      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database (sync_store)                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`sync_queue::SyncQueueRepository`] - Pending operation queue

pub mod sync_queue;
