//! # Operation Executors
//!
//! The execution collaborator delivers one operation to the remote store.
//! The engine hands it an [`ExecutionRequest`] and only cares whether the
//! result is `Ok` or `Err`.
//!
//! ## Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncEngine ──execute(req)──▶ ExecutorRegistry                         │
//! │                                   │                                     │
//! │                 ┌─────────────────┼───────────────────┐                 │
//! │                 ▼                 ▼                   ▼                 │
//! │          JOURNAL_CREATE    PROFILE_UPDATE      (unregistered)           │
//! │          JournalExecutor   ProfileExecutor     Err(NoExecutor)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations must treat [`ExecutionRequest::idempotency_key`] as the
//! deduplication key on the remote side; the same key arrives on every
//! retry of an operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use prody_core::{ConflictResolution, OperationType, SyncOperation};

use crate::error::ExecutionError;

// =============================================================================
// Request
// =============================================================================

/// Everything an executor needs to deliver one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub entity_id: Option<String>,
    /// Opaque payload, passed through untouched.
    pub payload: String,
    pub idempotency_key: String,
    pub conflict_resolution: ConflictResolution,
    /// 1-based number of this attempt.
    pub attempt: u32,
}

impl ExecutionRequest {
    /// Builds the request for the next attempt of `operation`.
    pub fn for_operation(operation: &SyncOperation) -> Self {
        ExecutionRequest {
            operation_id: operation.id.clone(),
            operation_type: operation.operation_type,
            entity_id: operation.entity_id.clone(),
            payload: operation.data.clone(),
            idempotency_key: operation.idempotency_key.clone(),
            conflict_resolution: operation.conflict_resolution,
            attempt: operation.attempt_count.saturating_add(1),
        }
    }
}

// =============================================================================
// Executor Trait
// =============================================================================

/// Delivers operations to the remote store.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<(), ExecutionError>;
}

#[async_trait]
impl<T: OperationExecutor + ?Sized> OperationExecutor for Arc<T> {
    async fn execute(&self, request: &ExecutionRequest) -> Result<(), ExecutionError> {
        (**self).execute(request).await
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Routes each [`OperationType`] to its own executor.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<OperationType, Arc<dyn OperationExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` for `operation_type`, replacing any previous one.
    pub fn register(
        mut self,
        operation_type: OperationType,
        executor: Arc<dyn OperationExecutor>,
    ) -> Self {
        self.executors.insert(operation_type, executor);
        self
    }

    /// Registers the same executor for every operation type.
    pub fn register_all(mut self, executor: Arc<dyn OperationExecutor>) -> Self {
        for operation_type in OperationType::ALL {
            self.executors.insert(operation_type, Arc::clone(&executor));
        }
        self
    }

    pub fn is_registered(&self, operation_type: OperationType) -> bool {
        self.executors.contains_key(&operation_type)
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.executors.keys().map(|t| t.as_str()).collect();
        registered.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("registered", &registered)
            .finish()
    }
}

#[async_trait]
impl OperationExecutor for ExecutorRegistry {
    async fn execute(&self, request: &ExecutionRequest) -> Result<(), ExecutionError> {
        match self.executors.get(&request.operation_type) {
            Some(executor) => executor.execute(request).await,
            None => Err(ExecutionError::NoExecutor(request.operation_type)),
        }
    }
}
