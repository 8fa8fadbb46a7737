//! # Status Aggregation
//!
//! How the engine folds its flags and the queue into one [`SyncStatus`],
//! plus the per-pass [`DrainReport`].
//!
//! ```text
//! disabled            → DISABLED
//! drain in progress   → SYNCING
//! queue empty         → SYNCED
//! offline             → OFFLINE
//! otherwise           → SyncStatus::settled(queue)
//! ```

use serde::{Deserialize, Serialize};

use prody_core::{SyncOperation, SyncStatus};

/// Engine-level inputs to the status computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInputs {
    pub enabled: bool,
    pub draining: bool,
    pub online: bool,
}

/// Status for `queue` given the engine flags.
pub fn derive_status(inputs: StatusInputs, queue: &[SyncOperation]) -> SyncStatus {
    if !inputs.enabled {
        SyncStatus::Disabled
    } else if inputs.draining {
        SyncStatus::Syncing
    } else if queue.is_empty() {
        SyncStatus::Synced
    } else if !inputs.online {
        SyncStatus::Offline
    } else {
        SyncStatus::settled(queue)
    }
}

/// What a single drain pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Executor calls made.
    pub attempted: usize,
    pub succeeded: usize,
    /// Executor calls that returned an error, panicked or timed out.
    pub failed: usize,
    /// Operations skipped because their retry time hadn't come.
    pub deferred: usize,
    /// The pass stopped early (connectivity lost or sync disabled).
    pub interrupted: bool,
}

impl DrainReport {
    /// True if nothing was attempted.
    pub fn is_noop(&self) -> bool {
        self.attempted == 0 && self.deferred == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prody_core::{LifecycleState, OperationType};

    const ONLINE: StatusInputs = StatusInputs {
        enabled: true,
        draining: false,
        online: true,
    };

    fn op(state: LifecycleState) -> SyncOperation {
        let mut op = SyncOperation::new(OperationType::SettingsUpdate, None, "{}", 0);
        op.lifecycle_state = state;
        op
    }

    #[test]
    fn test_disabled_wins() {
        let inputs = StatusInputs {
            enabled: false,
            draining: true,
            online: false,
        };
        assert_eq!(derive_status(inputs, &[]), SyncStatus::Disabled);
    }

    #[test]
    fn test_empty_queue_is_synced_even_offline() {
        let offline = StatusInputs {
            online: false,
            ..ONLINE
        };
        assert_eq!(derive_status(offline, &[]), SyncStatus::Synced);
        assert_eq!(
            derive_status(offline, &[op(LifecycleState::Pending)]),
            SyncStatus::Offline
        );
    }

    #[test]
    fn test_settled_statuses() {
        assert_eq!(
            derive_status(ONLINE, &[op(LifecycleState::Failed), op(LifecycleState::RetryScheduled)]),
            SyncStatus::Pending
        );
        assert_eq!(
            derive_status(ONLINE, &[op(LifecycleState::Failed)]),
            SyncStatus::Failed
        );
    }

    #[test]
    fn test_draining_reports_syncing() {
        let draining = StatusInputs {
            draining: true,
            ..ONLINE
        };
        assert_eq!(
            derive_status(draining, &[op(LifecycleState::Pending)]),
            SyncStatus::Syncing
        );
    }
}
