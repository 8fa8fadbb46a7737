//! # Sync Types
//!
//! Core types shared by the sync engine, the operation store and status
//! observers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Types                                      │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │   SyncOperation     │   │ LifecycleState  │   │ OperationType   │   │
//! │  │  ─────────────────  │   │  ─────────────  │   │  ─────────────  │   │
//! │  │  id (UUID)          │   │  Pending        │   │  JournalCreate  │   │
//! │  │  type               │   │  Syncing        │   │  ProfileUpdate  │   │
//! │  │  data (opaque)      │   │  Success        │   │  StreakUpdate   │   │
//! │  │  priority           │   │  Failed         │   │  ...            │   │
//! │  │  idempotency_key    │   │  RetryScheduled │   └─────────────────┘   │
//! │  └─────────────────────┘   └─────────────────┘                         │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │     SyncState       │   │   SyncStatus    │   │  SyncTelemetry  │   │
//! │  │  (derived, observed)│   │  Synced/Offline │   │  depth/stuck    │   │
//! │  └─────────────────────┘   └─────────────────┘   └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persisted Layout
//! A [`SyncOperation`] serializes with camelCase field names
//! (`id`, `type`, `entityId`, `data`, `createdAt`, `priority`,
//! `lifecycleState`, `attemptCount`, `lastError`, `nextRetryAt`,
//! `lastAttemptAt`, `idempotencyKey`, `conflictResolution`). The whole queue
//! is stored as a JSON array of these records.

use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Operation Type
// =============================================================================

/// The closed set of mutations that travel through the sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    JournalCreate,
    JournalUpdate,
    JournalDelete,
    ProfileUpdate,
    AchievementUnlock,
    StreakUpdate,
    FutureMessageCreate,
    FutureMessageUpdate,
    VocabularyProgress,
    SettingsUpdate,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [OperationType; 10] = [
        OperationType::JournalCreate,
        OperationType::JournalUpdate,
        OperationType::JournalDelete,
        OperationType::ProfileUpdate,
        OperationType::AchievementUnlock,
        OperationType::StreakUpdate,
        OperationType::FutureMessageCreate,
        OperationType::FutureMessageUpdate,
        OperationType::VocabularyProgress,
        OperationType::SettingsUpdate,
    ];

    /// Returns the wire name (e.g. `JOURNAL_CREATE`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::JournalCreate => "JOURNAL_CREATE",
            OperationType::JournalUpdate => "JOURNAL_UPDATE",
            OperationType::JournalDelete => "JOURNAL_DELETE",
            OperationType::ProfileUpdate => "PROFILE_UPDATE",
            OperationType::AchievementUnlock => "ACHIEVEMENT_UNLOCK",
            OperationType::StreakUpdate => "STREAK_UPDATE",
            OperationType::FutureMessageCreate => "FUTURE_MESSAGE_CREATE",
            OperationType::FutureMessageUpdate => "FUTURE_MESSAGE_UPDATE",
            OperationType::VocabularyProgress => "VOCABULARY_PROGRESS",
            OperationType::SettingsUpdate => "SETTINGS_UPDATE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownOperationType(s.to_string()))
    }
}

// =============================================================================
// Conflict Resolution
// =============================================================================

/// Strategy the remote side applies when it reports a conflicting version.
///
/// The engine never interprets this value; it is handed to the executor
/// with every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    LocalWins,
    ServerWins,
    #[default]
    LastWriteWins,
    KeepBoth,
}

// =============================================================================
// Lifecycle State
// =============================================================================

/// Lifecycle of a single queued operation.
///
/// ## State Machine
/// ```text
/// PENDING ──► SYNCING ──┬──► SUCCESS          (removed from queue)
///                 ▲     ├──► RETRY_SCHEDULED  (nextRetryAt set)
///                 │     └──► FAILED           (budget exhausted, kept)
///                 │               │
///                 └── nextRetryAt elapsed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Pending,
    Syncing,
    Success,
    Failed,
    RetryScheduled,
}

impl LifecycleState {
    /// True for states no automatic drain will move forward.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Success | LifecycleState::Failed)
    }

    /// True while the operation is still waiting for delivery.
    pub const fn is_awaiting_delivery(&self) -> bool {
        matches!(
            self,
            LifecycleState::Pending | LifecycleState::RetryScheduled
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Pending => "PENDING",
            LifecycleState::Syncing => "SYNCING",
            LifecycleState::Success => "SUCCESS",
            LifecycleState::Failed => "FAILED",
            LifecycleState::RetryScheduled => "RETRY_SCHEDULED",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Sync Operation
// =============================================================================

/// A unit of deferred work waiting to reach the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique identifier (UUID v4), stable for the operation's lifetime.
    pub id: String,

    /// Kind of mutation.
    #[serde(rename = "type")]
    pub operation_type: OperationType,

    /// Domain entity being synced, absent for payload-only operations.
    #[serde(default)]
    pub entity_id: Option<String>,

    /// Opaque serialized payload. Never interpreted by the engine.
    pub data: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Higher drains first.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub lifecycle_state: LifecycleState,

    /// Failed executions so far.
    #[serde(default)]
    pub attempt_count: u32,

    #[serde(default)]
    pub last_error: Option<String>,

    /// Earliest time another attempt may be made.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Generated once, sent with every attempt of this operation.
    pub idempotency_key: String,

    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

impl SyncOperation {
    /// Creates a PENDING operation with a fresh id and idempotency key.
    pub fn new(
        operation_type: OperationType,
        entity_id: Option<String>,
        data: impl Into<String>,
        priority: i32,
    ) -> Self {
        SyncOperation {
            id: Uuid::new_v4().to_string(),
            operation_type,
            entity_id,
            data: data.into(),
            created_at: Utc::now(),
            priority,
            lifecycle_state: LifecycleState::Pending,
            attempt_count: 0,
            last_error: None,
            next_retry_at: None,
            last_attempt_at: None,
            idempotency_key: Uuid::new_v4().to_string(),
            conflict_resolution: ConflictResolution::default(),
        }
    }

    /// Creates an operation whose payload is the JSON encoding of `payload`.
    ///
    /// ## Example
    /// ```rust
    /// use prody_core::{OperationType, SyncOperation};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Serialize, Deserialize, PartialEq, Debug)]
    /// struct Streak { days: u32 }
    ///
    /// let op = SyncOperation::with_payload(
    ///     OperationType::StreakUpdate, None, &Streak { days: 7 }, 1,
    /// ).unwrap();
    /// assert_eq!(op.payload_as::<Streak>().unwrap(), Streak { days: 7 });
    /// ```
    pub fn with_payload<T: Serialize>(
        operation_type: OperationType,
        entity_id: Option<String>,
        payload: &T,
        priority: i32,
    ) -> CoreResult<Self> {
        let data = serde_json::to_string(payload).map_err(|e| CoreError::InvalidPayload {
            operation_type: operation_type.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(operation_type, entity_id, data, priority))
    }

    /// Decodes the payload as JSON into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_str(&self.data).map_err(|e| CoreError::InvalidPayload {
            operation_type: self.operation_type.to_string(),
            reason: e.to_string(),
        })
    }

    /// Sets the conflict resolution strategy.
    pub fn with_conflict_resolution(mut self, strategy: ConflictResolution) -> Self {
        self.conflict_resolution = strategy;
        self
    }

    /// Returns true if `next_retry_at` is set and still ahead of `now`.
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.is_some_and(|at| at > now)
    }

    /// Returns true if the operation has sat in SYNCING or RETRY_SCHEDULED
    /// for longer than `threshold` since its last attempt.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        let in_flight = matches!(
            self.lifecycle_state,
            LifecycleState::Syncing | LifecycleState::RetryScheduled
        );
        in_flight
            && self
                .last_attempt_at
                .is_some_and(|at| now.signed_duration_since(at) > threshold)
    }

    /// Drain ordering: priority descending, then oldest first.
    ///
    /// The id is the final tie-break so ordering is total.
    pub fn drain_order(a: &SyncOperation, b: &SyncOperation) -> Ordering {
        (Reverse(a.priority), a.created_at, &a.id).cmp(&(Reverse(b.priority), b.created_at, &b.id))
    }
}

// =============================================================================
// Aggregate Status
// =============================================================================

/// Overall sync status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    Pending,
    Failed,
    Offline,
    Disabled,
}

impl SyncStatus {
    /// Status a queue settles in after a completed drain pass.
    ///
    /// ```text
    /// empty                          → SYNCED
    /// any PENDING / RETRY_SCHEDULED  → PENDING
    /// any FAILED                     → FAILED
    /// otherwise                      → PENDING
    /// ```
    pub fn settled(operations: &[SyncOperation]) -> SyncStatus {
        if operations.is_empty() {
            return SyncStatus::Synced;
        }
        if operations
            .iter()
            .any(|op| op.lifecycle_state.is_awaiting_delivery())
        {
            return SyncStatus::Pending;
        }
        if operations
            .iter()
            .any(|op| op.lifecycle_state == LifecycleState::Failed)
        {
            return SyncStatus::Failed;
        }
        SyncStatus::Pending
    }

    /// User-facing message for this status.
    pub fn message(&self, pending_count: usize) -> String {
        match self {
            SyncStatus::Synced => "All changes saved".to_string(),
            SyncStatus::Syncing => "Syncing…".to_string(),
            SyncStatus::Pending if pending_count == 1 => "1 change pending".to_string(),
            SyncStatus::Pending => format!("{} changes pending", pending_count),
            SyncStatus::Failed => "Sync failed, will retry".to_string(),
            SyncStatus::Offline => "Offline, changes saved locally".to_string(),
            SyncStatus::Disabled => "Sync disabled".to_string(),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Pending => "pending",
            SyncStatus::Failed => "failed",
            SyncStatus::Offline => "offline",
            SyncStatus::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Aggregate state published to observers after every queue mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,

    /// Operations still in the queue, FAILED ones included.
    pub pending_count: usize,

    #[ts(as = "Option<String>")]
    pub last_sync_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
}

impl SyncState {
    /// User-facing message for the current status.
    pub fn status_message(&self) -> String {
        self.status.message(self.pending_count)
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Observational counters over the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncTelemetry {
    pub queue_depth: usize,
    /// Operations with at least one failed attempt.
    pub retrying_count: usize,
    /// SYNCING / RETRY_SCHEDULED operations past the staleness threshold.
    pub stuck_count: usize,
    pub failed_count: usize,
}

impl SyncTelemetry {
    /// Computes telemetry for a queue snapshot.
    pub fn from_operations(
        operations: &[SyncOperation],
        now: DateTime<Utc>,
        stuck_threshold: Duration,
    ) -> Self {
        SyncTelemetry {
            queue_depth: operations.len(),
            retrying_count: operations.iter().filter(|op| op.attempt_count > 0).count(),
            stuck_count: operations
                .iter()
                .filter(|op| op.is_stuck(now, stuck_threshold))
                .count(),
            failed_count: operations
                .iter()
                .filter(|op| op.lifecycle_state == LifecycleState::Failed)
                .count(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn op_with(priority: i32, created_at: DateTime<Utc>) -> SyncOperation {
        let mut op = SyncOperation::new(OperationType::JournalUpdate, None, "{}", priority);
        op.created_at = created_at;
        op
    }

    #[test]
    fn test_new_operation_defaults() {
        let op = SyncOperation::new(OperationType::JournalCreate, Some("e-1".into()), "{id:1}", 5);
        assert_eq!(op.lifecycle_state, LifecycleState::Pending);
        assert_eq!(op.attempt_count, 0);
        assert_eq!(op.conflict_resolution, ConflictResolution::LastWriteWins);
        assert_ne!(op.id, op.idempotency_key);
        assert!(op.next_retry_at.is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let op = SyncOperation::new(OperationType::AchievementUnlock, None, "{}", 1);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "ACHIEVEMENT_UNLOCK");
        assert_eq!(json["lifecycleState"], "PENDING");
        assert_eq!(json["conflictResolution"], "LAST_WRITE_WINS");
        assert!(json.get("idempotencyKey").is_some());
        assert!(json.get("entityId").is_some());
    }

    #[test]
    fn test_operation_type_parsing() {
        assert_eq!(
            "journal_create".parse::<OperationType>().unwrap(),
            OperationType::JournalCreate
        );
        assert_eq!(
            "FUTURE-MESSAGE-UPDATE".parse::<OperationType>().unwrap(),
            OperationType::FutureMessageUpdate
        );
        assert!("nope".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_drain_order() {
        let t0 = Utc::now();
        let low = op_with(1, t0);
        let old_mid = op_with(5, t0);
        let new_mid = op_with(5, t0 + Duration::seconds(1));
        let high = op_with(10, t0 + Duration::seconds(2));

        let mut ops = vec![low.clone(), new_mid.clone(), old_mid.clone(), high.clone()];
        ops.sort_by(SyncOperation::drain_order);

        let ids: Vec<_> = ops.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec![high.id, old_mid.id, new_mid.id, low.id]);
    }

    #[test]
    fn test_backing_off_and_stuck() {
        let now = Utc::now();
        let mut op = op_with(0, now);
        assert!(!op.is_backing_off(now));

        op.next_retry_at = Some(now + Duration::seconds(30));
        assert!(op.is_backing_off(now));
        assert!(!op.is_backing_off(now + Duration::seconds(31)));

        op.lifecycle_state = LifecycleState::RetryScheduled;
        op.last_attempt_at = Some(now - Duration::minutes(10));
        assert!(op.is_stuck(now, Duration::minutes(5)));
        assert!(!op.is_stuck(now, Duration::minutes(15)));

        op.lifecycle_state = LifecycleState::Failed;
        assert!(!op.is_stuck(now, Duration::minutes(5)));
    }

    #[test]
    fn test_settled_status() {
        let now = Utc::now();
        assert_eq!(SyncStatus::settled(&[]), SyncStatus::Synced);

        let mut failed = op_with(0, now);
        failed.lifecycle_state = LifecycleState::Failed;
        assert_eq!(SyncStatus::settled(&[failed.clone()]), SyncStatus::Failed);

        let mut scheduled = op_with(0, now);
        scheduled.lifecycle_state = LifecycleState::RetryScheduled;
        assert_eq!(
            SyncStatus::settled(&[failed.clone(), scheduled]),
            SyncStatus::Pending
        );

        let mut interrupted = op_with(0, now);
        interrupted.lifecycle_state = LifecycleState::Syncing;
        assert_eq!(SyncStatus::settled(&[interrupted]), SyncStatus::Pending);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(SyncStatus::Synced.message(0), "All changes saved");
        assert_eq!(SyncStatus::Pending.message(3), "3 changes pending");
        assert_eq!(SyncStatus::Pending.message(1), "1 change pending");
        assert_eq!(
            SyncStatus::Offline.message(2),
            "Offline, changes saved locally"
        );
        assert_eq!(SyncStatus::Disabled.message(0), "Sync disabled");
    }

    #[test]
    fn test_telemetry_counts() {
        let now = Utc::now();
        let fresh = op_with(0, now);

        let mut retrying = op_with(0, now);
        retrying.attempt_count = 2;
        retrying.lifecycle_state = LifecycleState::RetryScheduled;
        retrying.last_attempt_at = Some(now - Duration::minutes(30));

        let mut failed = op_with(0, now);
        failed.attempt_count = 4;
        failed.lifecycle_state = LifecycleState::Failed;

        let telemetry =
            SyncTelemetry::from_operations(&[fresh, retrying, failed], now, Duration::minutes(5));
        assert_eq!(telemetry.queue_depth, 3);
        assert_eq!(telemetry.retrying_count, 2);
        assert_eq!(telemetry.stuck_count, 1);
        assert_eq!(telemetry.failed_count, 1);
    }
}
