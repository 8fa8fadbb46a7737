//! # prody-core: Pure Sync Types for Prody
//!
//! This crate holds the data model of the offline-first sync queue. It
//! contains types and pure rules only, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Prody Sync Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Domain repositories (journal, profile, ...)        │   │
//! │  │        queue_operation(JOURNAL_CREATE, entity, payload, 5)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    prody-sync (engine)                          │   │
//! │  │      enqueue ──► persist ──► drain ──► execute ──► status       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ prody-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌───────────────┐  ┌───────────────┐     │   │
//! │  │   │     types     │  │   validation  │  │     error     │     │   │
//! │  │   │ SyncOperation │  │ payload size  │  │  CoreError    │     │   │
//! │  │   │ SyncState     │  │ entity ids    │  │  Validation   │     │   │
//! │  │   └───────────────┘  └───────────────┘  └───────────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Operation, lifecycle, status and telemetry types
//! - [`error`] - Domain error types
//! - [`validation`] - Operation validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use prody_core::{LifecycleState, OperationType, SyncOperation};
//!
//! let op = SyncOperation::new(OperationType::JournalCreate, Some("entry-1".into()), "{id:1}", 5);
//!
//! assert_eq!(op.lifecycle_state, LifecycleState::Pending);
//! assert_eq!(op.attempt_count, 0);
//! assert!(!op.idempotency_key.is_empty());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Storage key under which the whole pending queue is persisted.
///
/// Every save replaces the full record stored under this key.
pub const PENDING_QUEUE_KEY: &str = "pending_sync_operations";

/// Default number of failed executions an operation may retry after.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Largest payload accepted into the queue (bytes).
///
/// ## Reason
/// The queue is rewritten in full on every mutation, so one oversized
/// payload slows down every later save.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Maximum length of an entity id reference.
pub const MAX_ENTITY_ID_LEN: usize = 128;
