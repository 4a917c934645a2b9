//! Cycle outcomes.

use rentsync_core::MergeReport;
use rentsync_protocol::Revision;
use std::time::Duration;

/// Outcome of a successful sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Changes received from the server.
    pub pulled: usize,
    /// How the pulled records were merged.
    pub merge: MergeReport,
    /// Coalesced entries pushed to the server.
    pub pushed: usize,
    /// Pushed entries the server had already applied.
    pub duplicates: usize,
    /// Change log entries cleared after the push was acknowledged.
    pub cleared: usize,
    /// Checkpoint after the cycle.
    pub checkpoint: Revision,
    /// Wall time of the cycle.
    pub duration: Duration,
}

/// What a cycle had already done when its push failed.
///
/// Pulled records stay merged; applying them again on the next cycle is a
/// no-op. Batches acknowledged before the failure are cleared from the
/// change log; the rest of the log and the checkpoint were not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialSync {
    /// Changes received from the server.
    pub pulled: usize,
    /// How the pulled records were merged.
    pub merge: MergeReport,
    /// `latestVersion` of the pull, not stored as the checkpoint.
    pub latest_version: Revision,
    /// Entries that were pending when the push was attempted.
    pub pending: usize,
    /// Coalesced entries acknowledged in earlier batches of this cycle.
    pub pushed: usize,
}
