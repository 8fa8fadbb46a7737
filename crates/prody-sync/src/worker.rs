//! # Sync Worker
//!
//! Background task that decides *when* to drain.
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncWorker::run                                  │
//! │                                                                         │
//! │  startup: online + enabled + work queued? ──▶ drain                    │
//! │                                                                         │
//! │  loop {                                                                 │
//! │    select! {                                                            │
//! │      connectivity.changed()  ──▶ AVAILABLE: drain                      │
//! │                                   otherwise: publish OFFLINE           │
//! │      drain_rx.recv()         ──▶ drain (requests coalesce, cap 1)      │
//! │      retry timer             ──▶ drain (earliest next_retry_at)        │
//! │      telemetry tick (30s)    ──▶ recompute stuck counts                │
//! │      shutdown_rx.recv()      ──▶ break                                 │
//! │    }                                                                    │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::connectivity::ConnectivityState;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};

/// How often telemetry is recomputed while nothing else happens.
const TELEMETRY_REFRESH: Duration = Duration::from_secs(30);

// =============================================================================
// Worker
// =============================================================================

/// Reacts to connectivity and drain requests for one engine.
pub(crate) struct SyncWorker {
    engine: SyncEngine,
    connectivity: watch::Receiver<ConnectivityState>,
    drain_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
    stopped_tx: oneshot::Sender<()>,
}

/// Handle for stopping the background worker.
#[derive(Debug)]
pub struct SyncWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    stopped_rx: oneshot::Receiver<()>,
}

impl SyncWorkerHandle {
    /// Stops the worker and waits for it to exit.
    ///
    /// A drain pass in progress finishes first.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))?;
        self.stopped_rx
            .await
            .map_err(|_| SyncError::ChannelError("Worker exited without acknowledging".into()))
    }

    /// True while the worker task is alive.
    pub fn is_running(&self) -> bool {
        !self.shutdown_tx.is_closed()
    }
}

impl SyncWorker {
    pub(crate) fn new(
        engine: SyncEngine,
        connectivity: watch::Receiver<ConnectivityState>,
        drain_rx: mpsc::Receiver<()>,
    ) -> (Self, SyncWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = oneshot::channel();

        let worker = SyncWorker {
            engine,
            connectivity,
            drain_rx,
            shutdown_rx,
            stopped_tx,
        };
        let handle = SyncWorkerHandle {
            shutdown_tx,
            stopped_rx,
        };

        (worker, handle)
    }

    /// Runs until shutdown is requested or the handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("Sync worker starting");

        // Changes before this point are reflected in the initial check.
        self.connectivity.borrow_and_update();
        if self.engine.is_online() && self.engine.is_sync_enabled() && self.engine.has_drainable_work().await {
            self.engine.drain().await;
        }

        let mut telemetry_tick =
            tokio::time::interval_at(Instant::now() + TELEMETRY_REFRESH, TELEMETRY_REFRESH);
        telemetry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut connectivity_open = true;
        loop {
            let retry_wait = self.retry_wait().await;

            tokio::select! {
                changed = self.connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        debug!("Connectivity source dropped; keeping last known state");
                        connectivity_open = false;
                        continue;
                    }
                    let state = *self.connectivity.borrow_and_update();
                    info!(%state, "Connectivity transition");
                    if state.is_online() {
                        self.engine.drain().await;
                    } else {
                        self.engine.refresh_state().await;
                    }
                }

                Some(()) = self.drain_rx.recv() => {
                    self.engine.drain().await;
                }

                _ = tokio::time::sleep(retry_wait.unwrap_or(Duration::ZERO)), if retry_wait.is_some() => {
                    debug!("Scheduled retry due");
                    self.engine.drain().await;
                }

                _ = telemetry_tick.tick() => {
                    self.engine.refresh_telemetry().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync worker shutting down");
                    break;
                }
            }
        }

        self.engine.return_drain_receiver(self.drain_rx);
        let _ = self.stopped_tx.send(());
        info!("Sync worker stopped");
    }

    /// How long to sleep before the next scheduled retry, if one is
    /// pending and a drain could act on it.
    async fn retry_wait(&self) -> Option<Duration> {
        if !self.engine.is_online() || !self.engine.is_sync_enabled() {
            return None;
        }
        self.engine.next_retry_in().await
    }
}
