//! # Sync Engine
//!
//! Owns the pending queue and drives each operation through its lifecycle.
//!
//! ## Operation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue ──▶ PENDING ──drain──▶ SYNCING ──Ok──▶ SUCCESS (removed)      │
//! │                                    │                                    │
//! │                                    │ Err / timeout / panic              │
//! │                                    ▼                                    │
//! │                       attempt_count += 1                                │
//! │                                    │                                    │
//! │              ┌─────────────────────┴───────────────────┐                │
//! │              │ attempt_count <= max_attempts           │ otherwise      │
//! │              ▼                                         ▼                │
//! │       RETRY_SCHEDULED                               FAILED              │
//! │       next_retry_at = now + backoff                 stays queued,       │
//! │              │                                      skipped by drains   │
//! │              │ next_retry_at elapsed                until manual retry  │
//! │              ▼                                                          │
//! │           SYNCING ...                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//! ```text
//! drain_permit (Semaphore, 1 permit)  held for a whole pass
//!   └── queue (Mutex<Vec<SyncOperation>>)  held for bookkeeping + persist,
//!                                          released around executor calls
//! ```
//! Enqueue only takes the queue lock, so callers never wait on the network.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use prody_core::validation::validate_operation;
use prody_core::{
    LifecycleState, OperationType, SyncOperation, SyncState, SyncStatus, SyncTelemetry,
};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityState;
use crate::error::{ExecutionError, SyncError, SyncResult};
use crate::executor::{ExecutionRequest, OperationExecutor};
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::status::{derive_status, DrainReport, StatusInputs};
use crate::store::OperationStore;
use crate::worker::{SyncWorker, SyncWorkerHandle};

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    store: Arc<dyn OperationStore>,
    executor: Arc<dyn OperationExecutor>,
    connectivity: watch::Receiver<ConnectivityState>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    rng_seed: Option<u64>,
}

impl SyncEngineBuilder {
    /// Overrides the default configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the wall clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Seeds the jitter source for reproducible retry times.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Validates the config, restores the persisted queue and publishes
    /// the initial state.
    ///
    /// ## Errors
    /// Invalid configuration, or a store that can't be read at all. A
    /// snapshot that exists but is corrupt is not an error: the engine
    /// starts empty and reports the problem in `SyncState::last_error`.
    pub async fn build(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;

        let policy = self.config.retry_policy();
        let scheduler = match self.rng_seed {
            Some(seed) => RetryScheduler::with_seed(policy, seed),
            None => RetryScheduler::new(policy),
        };

        let (queue, last_error) = match self.store.load().await {
            Ok(queue) => (queue, None),
            Err(SyncError::CorruptQueue(reason)) => {
                warn!(%reason, "Persisted sync queue was unreadable; starting with an empty queue");
                (
                    Vec::new(),
                    Some(format!(
                        "Saved sync queue could not be read and was reset: {}",
                        reason
                    )),
                )
            }
            Err(e) => return Err(e),
        };

        let enabled = self.config.is_sync_enabled();
        let online = self.connectivity.borrow().is_online();
        let status = derive_status(
            StatusInputs {
                enabled,
                draining: false,
                online,
            },
            &queue,
        );
        let now = self.clock.now();
        let stuck_threshold = self.config.stuck_threshold();

        let (state_tx, _) = watch::channel(SyncState {
            status,
            pending_count: queue.len(),
            last_sync_at: None,
            last_error,
        });
        let (telemetry_tx, _) = watch::channel(SyncTelemetry::from_operations(
            &queue,
            now,
            stuck_threshold,
        ));
        let (drain_tx, drain_rx) = mpsc::channel(1);

        info!(
            pending = queue.len(),
            %status,
            enabled,
            online,
            "Sync engine ready"
        );

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                store: self.store,
                executor: self.executor,
                connectivity: self.connectivity,
                clock: self.clock,
                policy,
                execution_timeout: self.config.execution_timeout(),
                stuck_threshold,
                queue: Mutex::new(queue),
                scheduler: Mutex::new(scheduler),
                drain_permit: Semaphore::new(1),
                enabled: AtomicBool::new(enabled),
                draining: AtomicBool::new(false),
                state_tx,
                telemetry_tx,
                drain_tx,
                drain_rx: std::sync::Mutex::new(Some(drain_rx)),
            }),
        })
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner {
    store: Arc<dyn OperationStore>,
    executor: Arc<dyn OperationExecutor>,
    connectivity: watch::Receiver<ConnectivityState>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    execution_timeout: Duration,
    stuck_threshold: chrono::Duration,

    queue: Mutex<Vec<SyncOperation>>,
    scheduler: Mutex<RetryScheduler>,
    drain_permit: Semaphore,
    enabled: AtomicBool,
    draining: AtomicBool,

    state_tx: watch::Sender<SyncState>,
    telemetry_tx: watch::Sender<SyncTelemetry>,

    /// Capacity 1: repeated requests while one is pending collapse into it.
    drain_tx: mpsc::Sender<()>,
    /// Taken by the worker while it runs.
    drain_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

/// Handle to the sync queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &*self.inner.state_tx.borrow())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Starts building an engine around its three collaborators.
    pub fn builder(
        store: impl OperationStore + 'static,
        executor: impl OperationExecutor + 'static,
        connectivity: watch::Receiver<ConnectivityState>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store: Arc::new(store),
            executor: Arc::new(executor),
            connectivity,
            config: SyncConfig::default(),
            clock: Arc::new(SystemClock),
            rng_seed: None,
        }
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Creates and enqueues an operation. Returns its id.
    pub async fn queue_operation(
        &self,
        operation_type: OperationType,
        entity_id: Option<String>,
        payload: impl Into<String>,
        priority: i32,
    ) -> String {
        let mut operation = SyncOperation::new(operation_type, entity_id, payload, priority);
        operation.created_at = self.inner.clock.now();
        self.enqueue(operation).await
    }

    /// Appends `operation` to the queue and persists it.
    ///
    /// Never fails: a validation problem or a failed save is logged and the
    /// operation is kept in memory regardless. An id already in the queue
    /// is ignored.
    pub async fn enqueue(&self, operation: SyncOperation) -> String {
        if let Err(e) = validate_operation(&operation) {
            warn!(operation_id = %operation.id, error = %e, "Enqueueing operation that failed validation");
        }
        self.admit(operation).await
    }

    /// Like [`enqueue`](Self::enqueue) but rejects operations that fail
    /// validation.
    pub async fn try_enqueue(&self, operation: SyncOperation) -> SyncResult<String> {
        validate_operation(&operation)?;
        Ok(self.admit(operation).await)
    }

    async fn admit(&self, mut operation: SyncOperation) -> String {
        let id = operation.id.clone();
        {
            let mut queue = self.inner.queue.lock().await;
            if queue.iter().any(|op| op.id == id) {
                warn!(operation_id = %id, "Operation already queued, ignoring duplicate");
                return id;
            }

            operation.lifecycle_state = LifecycleState::Pending;
            debug!(
                operation_id = %id,
                operation_type = %operation.operation_type,
                priority = operation.priority,
                "Operation queued"
            );
            queue.push(operation);

            self.persist(&queue).await;
            self.publish(&queue);
            info!(pending = queue.len(), "Sync queue updated");
        }

        if self.is_sync_enabled() && self.is_online() {
            self.request_drain();
        }
        id
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Runs one drain pass over the queue.
    ///
    /// Passes never overlap; a second caller waits for the first to finish.
    pub async fn drain(&self) -> DrainReport {
        let Ok(_permit) = self.inner.drain_permit.acquire().await else {
            return DrainReport::default();
        };

        let draining = {
            let queue = self.inner.queue.lock().await;
            if queue.is_empty() || !self.is_sync_enabled() || !self.is_online() {
                self.publish(&queue);
                return DrainReport::default();
            }

            let flag = DrainingFlag::raise(self);
            self.publish(&queue);
            debug!(pending = queue.len(), "Drain pass starting");
            flag
        };

        let report = self.drain_pass().await;

        drop(draining);
        {
            let queue = self.inner.queue.lock().await;
            self.persist(&queue).await;
            if report.failed == 0
                && !queue
                    .iter()
                    .any(|op| op.lifecycle_state == LifecycleState::Failed)
            {
                self.inner.state_tx.send_if_modified(|state| state.last_error.take().is_some());
            }
            self.publish(&queue);
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            deferred = report.deferred,
            interrupted = report.interrupted,
            "Drain pass finished"
        );
        report
    }

    async fn drain_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();

        let order: Vec<String> = {
            let queue = self.inner.queue.lock().await;
            let mut ordered: Vec<&SyncOperation> = queue.iter().collect();
            ordered.sort_by(|a, b| SyncOperation::drain_order(a, b));
            ordered.into_iter().map(|op| op.id.clone()).collect()
        };

        for id in order {
            if !self.is_online() {
                info!("Connectivity lost, stopping drain pass");
                report.interrupted = true;
                break;
            }
            if !self.is_sync_enabled() {
                info!("Sync disabled, stopping drain pass");
                report.interrupted = true;
                break;
            }

            let Some(request) = self.begin_attempt(&id, &mut report).await else {
                continue;
            };

            report.attempted += 1;
            let outcome = self.execute_guarded(&request).await;
            match &outcome {
                Ok(()) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
            self.finish_attempt(&id, outcome).await;
        }

        report
    }

    /// Moves the operation to SYNCING and builds its request, or returns
    /// `None` if it should be skipped this pass.
    async fn begin_attempt(&self, id: &str, report: &mut DrainReport) -> Option<ExecutionRequest> {
        let mut queue = self.inner.queue.lock().await;
        // Cleared while an earlier operation was executing
        let operation = queue.iter_mut().find(|op| op.id == id)?;

        if operation.lifecycle_state == LifecycleState::Failed {
            return None;
        }

        let now = self.inner.clock.now();
        if operation.is_backing_off(now) {
            operation.lifecycle_state = LifecycleState::RetryScheduled;
            report.deferred += 1;
            return None;
        }

        operation.lifecycle_state = LifecycleState::Syncing;
        operation.last_attempt_at = Some(now);
        let request = ExecutionRequest::for_operation(operation);

        debug!(
            operation_id = %id,
            operation_type = %request.operation_type,
            attempt = request.attempt,
            "Executing operation"
        );

        self.persist(&queue).await;
        self.publish(&queue);
        Some(request)
    }

    async fn finish_attempt(&self, id: &str, outcome: Result<(), ExecutionError>) {
        let mut queue = self.inner.queue.lock().await;
        let Some(index) = queue.iter().position(|op| op.id == id) else {
            return;
        };
        let now = self.inner.clock.now();

        match outcome {
            Ok(()) => {
                let done = queue.remove(index);
                info!(
                    operation_id = %done.id,
                    operation_type = %done.operation_type,
                    "Operation synced"
                );
                self.inner
                    .state_tx
                    .send_modify(|state| state.last_sync_at = Some(now));
            }
            Err(err) => {
                let message = err.to_string();
                let operation = &mut queue[index];
                operation.attempt_count = operation.attempt_count.saturating_add(1);
                operation.last_error = Some(message.clone());

                if self.inner.policy.allows_retry(operation.attempt_count) {
                    let delay = self
                        .inner
                        .scheduler
                        .lock()
                        .await
                        .next_delay(operation.attempt_count);
                    operation.next_retry_at = Some(add_delay(now, delay));
                    operation.lifecycle_state = LifecycleState::RetryScheduled;
                    warn!(
                        operation_id = %operation.id,
                        attempt = operation.attempt_count,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %message,
                        "Operation failed, retry scheduled"
                    );
                } else {
                    operation.next_retry_at = None;
                    operation.lifecycle_state = LifecycleState::Failed;
                    error!(
                        operation_id = %operation.id,
                        operation_type = %operation.operation_type,
                        attempt = operation.attempt_count,
                        error = %message,
                        "Operation failed permanently"
                    );
                    self.inner
                        .state_tx
                        .send_modify(|state| state.last_error = Some(message));
                }
            }
        }

        self.persist(&queue).await;
        self.publish(&queue);
    }

    /// Calls the executor under the timeout, turning a panic into an error.
    async fn execute_guarded(&self, request: &ExecutionRequest) -> Result<(), ExecutionError> {
        let call = AssertUnwindSafe(self.inner.executor.execute(request)).catch_unwind();
        match tokio::time::timeout(self.inner.execution_timeout, call).await {
            Err(_) => Err(ExecutionError::Timeout(self.inner.execution_timeout)),
            Ok(Err(panic)) => Err(ExecutionError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }

    // =========================================================================
    // Controls
    // =========================================================================

    /// Drains immediately. Returns `None` without doing anything when
    /// offline.
    pub async fn force_sync(&self) -> Option<DrainReport> {
        if !self.is_online() {
            debug!("Force sync requested while offline, ignoring");
            return None;
        }
        Some(self.drain().await)
    }

    /// Drops every queued operation.
    pub async fn clear_pending_operations(&self) {
        let mut queue = self.inner.queue.lock().await;
        let dropped = queue.len();
        queue.clear();

        if let Err(e) = self.inner.store.clear().await {
            error!(error = %e, "Failed to clear persisted sync queue");
        }

        self.inner.state_tx.send_modify(|state| {
            state.status = SyncStatus::Synced;
            state.pending_count = 0;
            state.last_error = None;
        });
        self.publish_telemetry(&queue);
        info!(dropped, "Sync queue cleared");
    }

    /// Turns automatic draining on or off. The queue is untouched.
    pub async fn set_sync_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }
        info!(enabled, "Sync enabled changed");

        let pending = {
            let queue = self.inner.queue.lock().await;
            self.publish(&queue);
            !queue.is_empty()
        };

        if enabled && pending && self.is_online() {
            self.request_drain();
        }
    }

    /// Gives every FAILED operation another chance.
    ///
    /// Returns how many were reset. `attempt_count` is kept, so each gets
    /// exactly one more attempt before failing again.
    pub async fn retry_failed_operations(&self) -> usize {
        let reset = {
            let mut queue = self.inner.queue.lock().await;
            let mut reset = 0;
            for operation in queue
                .iter_mut()
                .filter(|op| op.lifecycle_state == LifecycleState::Failed)
            {
                operation.lifecycle_state = LifecycleState::Pending;
                operation.next_retry_at = None;
                reset += 1;
            }
            if reset > 0 {
                self.persist(&queue).await;
                self.publish(&queue);
            }
            reset
        };

        if reset > 0 {
            info!(reset, "Failed operations re-queued");
            if self.is_sync_enabled() && self.is_online() {
                self.request_drain();
            }
        }
        reset
    }

    /// Spawns the background worker.
    ///
    /// ## Errors
    /// `SyncError::Internal` if a worker is already running for this engine.
    pub fn start(&self) -> SyncResult<SyncWorkerHandle> {
        let drain_rx = self
            .inner
            .drain_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SyncError::Internal("sync worker already running".into()))?;

        let (worker, handle) = SyncWorker::new(self.clone(), self.inner.connectivity.clone(), drain_rx);
        tokio::spawn(worker.run());
        Ok(handle)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> SyncState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    pub fn telemetry(&self) -> SyncTelemetry {
        *self.inner.telemetry_tx.borrow()
    }

    pub fn subscribe_telemetry(&self) -> watch::Receiver<SyncTelemetry> {
        self.inner.telemetry_tx.subscribe()
    }

    /// Snapshot of the queue in drain order.
    pub async fn pending_operations(&self) -> Vec<SyncOperation> {
        let mut snapshot = self.inner.queue.lock().await.clone();
        snapshot.sort_by(SyncOperation::drain_order);
        snapshot
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.borrow().is_online()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    // =========================================================================
    // Worker Support
    // =========================================================================

    /// Asks the worker for a drain pass. Coalesces with a pending request.
    pub(crate) fn request_drain(&self) {
        match self.inner.drain_tx.try_send(()) {
            Ok(()) => debug!("Drain requested"),
            Err(mpsc::error::TrySendError::Full(())) => debug!("Drain already requested"),
            Err(mpsc::error::TrySendError::Closed(())) => {}
        }
    }

    /// Hands the drain receiver back when the worker stops.
    pub(crate) fn return_drain_receiver(&self, drain_rx: mpsc::Receiver<()>) {
        *self.inner.drain_rx.lock().unwrap_or_else(|e| e.into_inner()) = Some(drain_rx);
    }

    /// Recomputes and publishes state, e.g. after a connectivity change.
    pub(crate) async fn refresh_state(&self) {
        let queue = self.inner.queue.lock().await;
        self.publish(&queue);
    }

    /// Recomputes telemetry against the current time, so `stuck_count`
    /// moves even when the queue doesn't.
    pub(crate) async fn refresh_telemetry(&self) {
        let queue = self.inner.queue.lock().await;
        self.publish_telemetry(&queue);
    }

    /// True if the queue holds work a drain could act on.
    pub(crate) async fn has_drainable_work(&self) -> bool {
        self.inner
            .queue
            .lock()
            .await
            .iter()
            .any(|op| op.lifecycle_state != LifecycleState::Failed)
    }

    /// Time until the earliest scheduled retry falls due.
    pub(crate) async fn next_retry_in(&self) -> Option<Duration> {
        let queue = self.inner.queue.lock().await;
        let earliest = queue
            .iter()
            .filter(|op| op.lifecycle_state != LifecycleState::Failed)
            .filter_map(|op| op.next_retry_at)
            .min()?;
        let wait = earliest.signed_duration_since(self.inner.clock.now());
        Some(wait.to_std().unwrap_or(Duration::ZERO))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Saves the snapshot. Failures are logged; memory stays authoritative.
    async fn persist(&self, queue: &[SyncOperation]) {
        if let Err(e) = self.inner.store.save(queue).await {
            error!(error = %e, pending = queue.len(), "Failed to persist sync queue");
        }
    }

    fn publish(&self, queue: &[SyncOperation]) {
        let status = derive_status(
            StatusInputs {
                enabled: self.is_sync_enabled(),
                draining: self.inner.draining.load(Ordering::SeqCst),
                online: self.is_online(),
            },
            queue,
        );
        self.inner.state_tx.send_if_modified(|state| {
            let changed = state.status != status || state.pending_count != queue.len();
            state.status = status;
            state.pending_count = queue.len();
            changed
        });
        self.publish_telemetry(queue);
    }

    fn publish_telemetry(&self, queue: &[SyncOperation]) {
        let telemetry =
            SyncTelemetry::from_operations(queue, self.inner.clock.now(), self.inner.stuck_threshold);
        self.inner.telemetry_tx.send_if_modified(|current| {
            if *current == telemetry {
                false
            } else {
                *current = telemetry;
                true
            }
        });
    }
}

/// Holds `draining` true for the life of a pass. If the `drain()` future
/// is dropped mid-pass the flag still comes down and the status is
/// republished when the queue lock is free.
struct DrainingFlag<'a> {
    engine: &'a SyncEngine,
}

impl<'a> DrainingFlag<'a> {
    fn raise(engine: &'a SyncEngine) -> Self {
        engine.inner.draining.store(true, Ordering::SeqCst);
        DrainingFlag { engine }
    }
}

impl Drop for DrainingFlag<'_> {
    fn drop(&mut self) {
        self.engine.inner.draining.store(false, Ordering::SeqCst);
        if let Ok(queue) = self.engine.inner.queue.try_lock() {
            self.engine.publish(&queue);
        }
    }
}

fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::connectivity::ConnectivityMonitor;
    use crate::store::MemoryOperationStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Fails;

    #[async_trait]
    impl OperationExecutor for Fails {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<(), ExecutionError> {
            Err(ExecutionError::Transport("connection reset".into()))
        }
    }

    #[derive(Default)]
    struct Succeeds {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OperationExecutor for Succeeds {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<(), ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl OperationExecutor for Panics {
        async fn execute(&self, _request: &ExecutionRequest) -> Result<(), ExecutionError> {
            panic!("executor blew up");
        }
    }

    #[test]
    fn test_add_delay_saturates() {
        let now = Utc::now();
        assert_eq!(add_delay(now, Duration::from_secs(2)), now + chrono::Duration::seconds(2));
        assert_eq!(add_delay(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn test_failure_schedules_retry_after_now() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Available);
        let clock = ManualClock::default();
        let engine = SyncEngine::builder(MemoryOperationStore::new(), Fails, monitor.subscribe())
            .clock(clock.clone())
            .rng_seed(3)
            .build()
            .await
            .unwrap();

        engine
            .queue_operation(OperationType::JournalCreate, None, "{}", 0)
            .await;
        let report = engine.drain().await;
        assert_eq!(report.failed, 1);

        let op = &engine.pending_operations().await[0];
        assert_eq!(op.lifecycle_state, LifecycleState::RetryScheduled);
        assert_eq!(op.attempt_count, 1);
        assert!(op.next_retry_at.unwrap() > clock.now());
        assert_eq!(op.last_error.as_deref(), Some("Transport error: connection reset"));
    }

    #[tokio::test]
    async fn test_panicking_executor_counts_as_failure() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Available);
        let engine = SyncEngine::builder(MemoryOperationStore::new(), Panics, monitor.subscribe())
            .build()
            .await
            .unwrap();

        engine
            .queue_operation(OperationType::ProfileUpdate, None, "{}", 0)
            .await;
        let report = engine.drain().await;

        assert_eq!(report.failed, 1);
        let op = &engine.pending_operations().await[0];
        assert!(op.last_error.as_deref().unwrap().contains("executor blew up"));
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_queue() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Unavailable);
        let store = MemoryOperationStore::new();
        store.set_fail_writes(true);
        let executor = Arc::new(Succeeds::default());
        let engine = SyncEngine::builder(store.clone(), executor.clone(), monitor.subscribe())
            .build()
            .await
            .unwrap();

        let id = engine
            .queue_operation(OperationType::SettingsUpdate, None, "{}", 0)
            .await;
        assert_eq!(engine.state().pending_count, 1);
        assert_eq!(store.raw().await, None);

        store.set_fail_writes(false);
        monitor.set(ConnectivityState::Available);
        let report = engine.drain().await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert!(engine.pending_operations().await.iter().all(|op| op.id != id));
        assert_eq!(store.raw().await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty_with_diagnostic() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Available);
        let engine = SyncEngine::builder(
            MemoryOperationStore::with_raw("{garbage"),
            Succeeds::default(),
            monitor.subscribe(),
        )
        .build()
        .await
        .unwrap();

        let state = engine.state();
        assert_eq!(state.pending_count, 0);
        assert_eq!(state.status, SyncStatus::Synced);
        assert!(state.last_error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let monitor = ConnectivityMonitor::default();
        let mut config = SyncConfig::default();
        config.retry.base_delay_ms = 0;

        let err = SyncEngine::builder(MemoryOperationStore::new(), Fails, monitor.subscribe())
            .config(config)
            .build()
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_try_enqueue_validates() {
        let monitor = ConnectivityMonitor::default();
        let engine = SyncEngine::builder(MemoryOperationStore::new(), Fails, monitor.subscribe())
            .build()
            .await
            .unwrap();

        let mut bad = SyncOperation::new(OperationType::JournalUpdate, None, "{}", 0);
        bad.id = "not-a-uuid".into();

        assert!(matches!(
            engine.try_enqueue(bad).await,
            Err(SyncError::InvalidOperation(_))
        ));
        assert_eq!(engine.state().pending_count, 0);
    }
}
