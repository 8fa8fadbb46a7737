//! # Sync Error Types
//!
//! Error types for the sync engine and its collaborators.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  SyncError (engine + store plumbing)                                   │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Internal            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  StorageFailed  │  │  ChannelError           │ │
//! │  │  ConfigLoad     │  │  CorruptQueue   │  │  ShuttingDown           │ │
//! │  │  ConfigSave     │  │  Serialization  │  │  InvalidOperation       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ExecutionError (one delivery attempt)                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ Rejected │ Transport │ Timeout │ Panicked │ NoExecutor │ Conflict│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │  The engine treats every variant the same way: count the attempt,     │
//! │  schedule a retry or mark FAILED.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use prody_core::{OperationType, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering engine, store and configuration failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The backing store could not be read or written.
    #[error("Storage error: {0}")]
    StorageFailed(String),

    /// The persisted queue exists but cannot be decoded.
    #[error("Persisted queue is corrupt: {0}")]
    CorruptQueue(String),

    /// Failed to serialize the queue.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Operation Errors
    // =========================================================================
    /// Operation rejected before it entered the queue.
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Worker is shutting down.
    #[error("Sync worker is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<prody_db::DbError> for SyncError {
    fn from(err: prody_db::DbError) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came from the persistence layer.
    ///
    /// Storage errors never drop the in-memory queue; the next save
    /// writes the full snapshot again.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SyncError::StorageFailed(_)
                | SyncError::CorruptQueue(_)
                | SyncError::SerializationFailed(_)
        )
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Outcome of a single failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The remote side refused the operation.
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    /// Network or transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The executor didn't finish in time.
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    /// The executor panicked.
    #[error("Executor panicked: {0}")]
    Panicked(String),

    /// Nothing is registered for this operation type.
    #[error("No executor registered for {0}")]
    NoExecutor(OperationType),

    /// The remote copy diverged and the conflict strategy couldn't settle it.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ExecutionError {
    /// Returns true for failures that might succeed on a later attempt.
    ///
    /// Only informational: the engine retries every kind until the
    /// attempt budget runs out.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutionError::Transport(_) | ExecutionError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(SyncError::CorruptQueue("eof".into()).is_storage_error());
        assert!(!SyncError::ShuttingDown.is_storage_error());
        assert!(!SyncError::StorageFailed("disk".into()).is_config_error());
    }

    #[test]
    fn test_db_error_is_storage_error() {
        let err: SyncError = prody_db::DbError::Busy.into();
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_transient_execution_errors() {
        assert!(ExecutionError::Transport("reset".into()).is_transient());
        assert!(ExecutionError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(!ExecutionError::Rejected("400".into()).is_transient());
        assert!(!ExecutionError::NoExecutor(OperationType::JournalCreate).is_transient());
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::NoExecutor(OperationType::ProfileUpdate);
        assert_eq!(err.to_string(), "No executor registered for PROFILE_UPDATE");
    }
}
