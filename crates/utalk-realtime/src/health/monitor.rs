//! Connection health monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use utalk_core::AppResult;
use utalk_transport::client::Transport;
use utalk_transport::status::ConnectionState;

/// Observes the transport's connection state and republishes it on a fixed
/// poll cadence plus immediately on every change.
///
/// Purely derived: the monitor never mutates the transport on its own. The
/// one write path it exposes, [`Self::reconnect_now`], is the manual-reconnect
/// affordance, which re-runs the handshake with the last-known credentials.
pub struct ConnectionHealthMonitor {
    transport: Arc<dyn Transport>,
    observed_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionHealthMonitor {
    /// Create the monitor and start its observation task.
    pub fn new(transport: Arc<dyn Transport>, poll_interval: Duration) -> Self {
        let mut upstream = transport.state();
        let (observed_tx, _) = watch::channel(*upstream.borrow());
        let cancel = CancellationToken::new();

        {
            let observed_tx = observed_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(poll_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            let current = *upstream.borrow();
                            observed_tx.send_if_modified(|state| {
                                let changed = *state != current;
                                *state = current;
                                changed
                            });
                        }
                        changed = upstream.changed() => {
                            if changed.is_err() {
                                // Transport dropped; final state stands.
                                break;
                            }
                            let current = *upstream.borrow();
                            debug!(?current, "Connection state changed");
                            observed_tx.send_if_modified(|state| {
                                let changed = *state != current;
                                *state = current;
                                changed
                            });
                        }
                    }
                }
            });
        }

        Self {
            transport,
            observed_tx,
            cancel,
        }
    }

    /// Current observed state.
    pub fn status(&self) -> ConnectionState {
        *self.observed_tx.borrow()
    }

    /// Subscribe to observed-state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.observed_tx.subscribe()
    }

    /// Manually re-run the transport handshake with the last-known
    /// credentials. Available at any time, including after the automatic
    /// reconnection budget is exhausted.
    pub async fn reconnect_now(&self) -> AppResult<()> {
        info!("Manual reconnect requested");
        self.transport.reconnect().await
    }

    /// Stop the observation task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionHealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
