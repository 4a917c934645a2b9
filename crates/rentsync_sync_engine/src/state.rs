//! Sync engine state machine.

use crate::applier::SyncApplier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::summary::{PartialSync, SyncSummary};
use parking_lot::RwLock;
use rentsync_protocol::{coalesce, PullRequest, PushRequest, RecordId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Fetching changes from the server.
    Pulling,
    /// Merging pulled records into the local store.
    Merging,
    /// Sending local changes to the server.
    Pushing,
    /// The last cycle completed.
    Synced,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pulling | SyncState::Merging | SyncState::Pushing
        )
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Calls rejected because a cycle was running.
    pub rejected: u64,
    /// Changes received from the server.
    pub changes_pulled: u64,
    /// Pulled records written locally.
    pub records_applied: u64,
    /// Pulled records dropped as stale.
    pub stale_dropped: u64,
    /// Coalesced entries pushed and acknowledged.
    pub changes_pushed: u64,
    /// Retries made by `synchronize_with_retry`.
    pub retries: u64,
    /// Last completed cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Resets the in-flight flag when a cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs sync cycles between a local replica and the server.
///
/// A cycle pulls changes since the checkpoint, merges them by revision,
/// pushes coalesced local changes, clears what the server acknowledged and
/// advances the checkpoint. Only one cycle runs at a time; a concurrent
/// call returns [`SyncError::AlreadyInProgress`] instead of waiting.
///
/// # Example
///
/// ```rust
/// use rentsync_core::{Replica, ReplicaConfig};
/// use rentsync_sync_engine::{MockGateway, ReplicaApplier, SyncConfig, SyncEngine};
/// use std::sync::Arc;
///
/// let replica = Arc::new(Replica::open_in_memory(ReplicaConfig::default()).unwrap());
/// let engine = SyncEngine::new(
///     SyncConfig::default(),
///     MockGateway::new(),
///     ReplicaApplier::new(Arc::clone(&replica)),
/// );
///
/// let summary = engine.synchronize().unwrap();
/// assert_eq!(summary.pushed, 0);
/// ```
pub struct SyncEngine<G: RemoteGateway, A: SyncApplier> {
    config: SyncConfig,
    gateway: Arc<G>,
    applier: Arc<A>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
}

impl<G: RemoteGateway, A: SyncApplier> SyncEngine<G, A> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, gateway: G, applier: A) -> Self {
        Self {
            config,
            gateway: Arc::new(gateway),
            applier: Arc::new(applier),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Returns the applier.
    pub fn applier(&self) -> &Arc<A> {
        &self.applier
    }

    /// Returns true while a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one sync cycle.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyInProgress`] if another cycle is running
    /// - [`SyncError::PullFailed`] if the pull failed; nothing local changed
    /// - [`SyncError::PushFailed`] if a push batch failed; pulled records
    ///   stay merged, batches acknowledged before it are cleared, the rest of
    ///   the change log and the checkpoint are untouched
    /// - [`SyncError::Local`] if the replica failed
    pub fn synchronize(&self) -> SyncResult<SyncSummary> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.write().rejected += 1;
            return Err(SyncError::AlreadyInProgress);
        }
        let _in_flight = InFlight(&self.in_flight);

        let start = Instant::now();
        match self.run_cycle(start) {
            Ok(summary) => {
                self.set_state(SyncState::Synced);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.changes_pulled += summary.pulled as u64;
                stats.records_applied += summary.merge.applied() as u64;
                stats.stale_dropped += summary.merge.stale.len() as u64;
                stats.changes_pushed += summary.pushed as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                drop(stats);

                tracing::info!(
                    pulled = summary.pulled,
                    applied = summary.merge.applied(),
                    pushed = summary.pushed,
                    checkpoint = summary.checkpoint,
                    elapsed_ms = summary.duration.as_millis() as u64,
                    "sync cycle completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    fn run_cycle(&self, start: Instant) -> SyncResult<SyncSummary> {
        // 1. checkpoint, 2. pull
        self.set_state(SyncState::Pulling);
        let since = self.applier.checkpoint()?;
        let response = self
            .gateway
            .pull(&PullRequest::new(since))
            .map_err(SyncError::pull_failed)?;
        let latest_version = response.latest_version;
        tracing::debug!(since, latest_version, changes = response.len(), "pulled");

        // 3. merge
        self.set_state(SyncState::Merging);
        let merge = self.applier.apply_remote(response.records())?;

        // 4. push in batches, clearing each acknowledged batch
        self.set_state(SyncState::Pushing);
        let pending = self.applier.pending_changes()?;
        let pending_count = pending.len();
        let changes = coalesce(pending.clone());
        let batch_size = self.config.max_push_batch.max(1);

        let mut pushed = 0;
        let mut duplicates = 0;
        let mut cleared = 0;
        for batch in changes.chunks(batch_size) {
            let ids: HashSet<&RecordId> = batch.iter().map(|e| &e.record_id).collect();
            let seqs: Vec<u64> = pending
                .iter()
                .filter(|e| ids.contains(&e.record_id))
                .map(|e| e.seq)
                .collect();

            tracing::debug!(
                pending = pending_count,
                coalesced = changes.len(),
                batch = batch.len(),
                "pushing"
            );
            let ack = self
                .gateway
                .push(&PushRequest::new(batch.to_vec()))
                .map_err(|cause| SyncError::PushFailed {
                    cause: Box::new(cause),
                    partial: PartialSync {
                        pulled: response.len(),
                        merge: merge.clone(),
                        latest_version,
                        pending: pending_count,
                        pushed,
                    },
                })?;
            duplicates += ack.duplicates;
            cleared += self.applier.acknowledge(&seqs)?;
            pushed += batch.len();
        }

        // 5. advance
        let checkpoint = self.applier.advance_checkpoint(latest_version)?;

        Ok(SyncSummary {
            pulled: response.len(),
            merge,
            pushed,
            duplicates,
            cleared,
            checkpoint,
            duration: start.elapsed(),
        })
    }

    /// Runs [`synchronize`](Self::synchronize), retrying retryable errors
    /// with exponential backoff from the configured [`RetryConfig`].
    ///
    /// Blocks the calling thread while waiting between attempts.
    ///
    /// [`RetryConfig`]: crate::RetryConfig
    pub fn synchronize_with_retry(&self) -> SyncResult<SyncSummary> {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.synchronize() {
                Ok(summary) => return Ok(summary),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    tracing::debug!(attempt, error = %e, "retrying sync");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_error(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
        drop(stats);
        tracing::warn!(error = %error, "sync cycle failed");
    }
}
