//! Connectivity and foreground triggers.
//!
//! Cycles are started by signals from the app: the network coming back and
//! the app returning to the foreground. Signals that arrive while a cycle is
//! running are not queued; the loop waits for the cycle and then looks at
//! the latest connectivity value.

use crate::applier::SyncApplier;
use crate::error::SyncError;
use crate::gateway::RemoteGateway;
use crate::state::SyncEngine;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Decides when a connectivity or foreground signal should start a cycle.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityTrigger {
    online: Option<bool>,
}

impl ConnectivityTrigger {
    /// Creates a trigger that has not seen any connectivity value yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connectivity value.
    ///
    /// Returns true on the first online observation and whenever the device
    /// goes from offline to online.
    pub fn observe(&mut self, online: bool) -> bool {
        let previous = self.online.replace(online);
        online && previous != Some(true)
    }

    /// Returns true if a foreground signal should start a cycle, which is
    /// whenever the device is not known to be offline.
    pub fn foreground(&self) -> bool {
        self.online != Some(false)
    }

    /// Returns the last observed connectivity value.
    pub fn online(&self) -> Option<bool> {
        self.online
    }
}

/// Runs a cycle each time `connectivity` goes online.
///
/// Returns the number of cycles started once the sender is dropped.
pub async fn run_on_connectivity<G, A>(
    engine: Arc<SyncEngine<G, A>>,
    connectivity: watch::Receiver<bool>,
) -> u64
where
    G: RemoteGateway + 'static,
    A: SyncApplier + 'static,
{
    run_triggers(engine, connectivity, None).await
}

/// Runs cycles on connectivity and, optionally, foreground signals.
///
/// Cycles run one at a time on the blocking pool and each is awaited before
/// the next signal is read. Failed cycles are logged and left for the next
/// signal. Returns the number of cycles started once the connectivity sender
/// is dropped.
pub async fn run_triggers<G, A>(
    engine: Arc<SyncEngine<G, A>>,
    mut connectivity: watch::Receiver<bool>,
    mut foreground: Option<mpsc::Receiver<()>>,
) -> u64
where
    G: RemoteGateway + 'static,
    A: SyncApplier + 'static,
{
    let mut trigger = ConnectivityTrigger::new();
    let mut cycles = 0;

    let initial = *connectivity.borrow_and_update();
    if trigger.observe(initial) {
        engine.gateway().reconnect();
        run_cycle(&engine, "connectivity").await;
        cycles += 1;
    } else {
        engine.gateway().disconnect();
    }

    loop {
        let reason = tokio::select! {
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *connectivity.borrow_and_update();
                if !trigger.observe(online) {
                    tracing::debug!(online, "connectivity changed");
                    if !online {
                        engine.gateway().disconnect();
                    }
                    continue;
                }
                engine.gateway().reconnect();
                "connectivity"
            }
            signal = recv_foreground(&mut foreground) => {
                if signal.is_none() {
                    foreground = None;
                    continue;
                }
                if !trigger.foreground() {
                    continue;
                }
                "foreground"
            }
        };

        run_cycle(&engine, reason).await;
        cycles += 1;
    }

    tracing::debug!(cycles, "sync trigger loop stopped");
    cycles
}

async fn recv_foreground(foreground: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match foreground {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_cycle<G, A>(engine: &Arc<SyncEngine<G, A>>, reason: &'static str)
where
    G: RemoteGateway + 'static,
    A: SyncApplier + 'static,
{
    tracing::debug!(reason, "starting sync cycle");
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || engine.synchronize()).await {
        Ok(Ok(_)) => {}
        Ok(Err(SyncError::AlreadyInProgress)) => {
            tracing::debug!(reason, "sync already running");
        }
        Ok(Err(e)) => {
            tracing::info!(reason, error = %e, "sync failed; waiting for next trigger");
        }
        Err(e) => {
            tracing::error!(reason, error = %e, "sync task panicked");
        }
    }
}
