//! The revision merge rule.
//!
//! A remote record overwrites the local one when the local one is absent or
//! its revision is not newer. Revisions are server versions, never wall-clock
//! times, so device clock skew cannot reorder writes. Tombstones follow the
//! same comparison as live records.

use crate::record::Record;

/// Outcome of comparing a remote record to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local record with this id exists.
    Insert,
    /// The remote revision is equal or higher.
    Overwrite,
    /// The local revision is higher; the remote record is dropped.
    Stale,
}

impl MergeDecision {
    /// Returns true if the remote record should be written.
    #[must_use]
    pub fn applies(self) -> bool {
        !matches!(self, MergeDecision::Stale)
    }
}

/// Compares `remote` with the current local record for the same id.
#[must_use]
pub fn decide(local: Option<&Record>, remote: &Record) -> MergeDecision {
    match local {
        None => MergeDecision::Insert,
        Some(local) if remote.revision >= local.revision => MergeDecision::Overwrite,
        Some(_) => MergeDecision::Stale,
    }
}
