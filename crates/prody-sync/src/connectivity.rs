//! # Connectivity
//!
//! The engine never checks the network itself. Platform glue pushes
//! state changes into a [`ConnectivityMonitor`]; the engine holds the
//! receiving side of the same `watch` channel.
//!
//! ```text
//! ┌──────────────────┐   set(state)   ┌──────────────┐  borrow()/changed()
//! │ platform network │ ─────────────▶ │ watch channel │ ──────────────────▶ SyncEngine
//! │ callback         │                └──────────────┘
//! └──────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Network reachability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    /// Network usable.
    Available,
    /// Network about to drop.
    Losing,
    /// Network dropped.
    Lost,
    /// No network at all.
    #[default]
    Unavailable,
}

impl ConnectivityState {
    /// Only `Available` counts as online.
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Available)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Available => write!(f, "available"),
            ConnectivityState::Losing => write!(f, "losing"),
            ConnectivityState::Lost => write!(f, "lost"),
            ConnectivityState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Sending side of the connectivity channel.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor starting in `initial`.
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _) = watch::channel(initial);
        ConnectivityMonitor {
            tx: Arc::new(tx),
        }
    }

    /// Publishes a new state. Repeating the current state wakes nobody.
    pub fn set(&self, state: ConnectivityState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(%state, "Connectivity changed");
        }
    }

    /// Current state.
    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Receiver to hand to the engine.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_available_is_online() {
        assert!(ConnectivityState::Available.is_online());
        assert!(!ConnectivityState::Losing.is_online());
        assert!(!ConnectivityState::Lost.is_online());
        assert!(!ConnectivityState::Unavailable.is_online());
    }

    #[tokio::test]
    async fn test_monitor_notifies_on_change_only() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Unavailable);
        let mut rx = monitor.subscribe();

        monitor.set(ConnectivityState::Unavailable);
        assert!(!rx.has_changed().unwrap());

        monitor.set(ConnectivityState::Available);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Available);
        assert_eq!(monitor.current(), ConnectivityState::Available);
    }
}
