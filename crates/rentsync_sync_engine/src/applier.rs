//! The local side of a sync cycle.

use crate::error::SyncResult;
use rentsync_core::{MergeReport, Replica};
use rentsync_protocol::{ChangeEntry, Record, Revision};
use std::sync::Arc;

/// What the engine needs from the local replica.
pub trait SyncApplier: Send + Sync {
    /// Returns the last fully synchronized server version.
    fn checkpoint(&self) -> SyncResult<Revision>;

    /// Merges pulled records by revision, all or nothing.
    fn apply_remote(&self, records: Vec<Record>) -> SyncResult<MergeReport>;

    /// Returns pending local changes in seq order, without removing them.
    fn pending_changes(&self) -> SyncResult<Vec<ChangeEntry>>;

    /// Drops the pending changes with the given seqs after the server
    /// acknowledged them. Returns how many were dropped.
    fn acknowledge(&self, seqs: &[u64]) -> SyncResult<usize>;

    /// Stores a new checkpoint. Never moves the checkpoint backwards.
    fn advance_checkpoint(&self, version: Revision) -> SyncResult<Revision>;
}

/// Applier over a [`Replica`].
#[derive(Debug, Clone)]
pub struct ReplicaApplier {
    replica: Arc<Replica>,
}

impl ReplicaApplier {
    /// Creates an applier for `replica`.
    pub fn new(replica: Arc<Replica>) -> Self {
        Self { replica }
    }

    /// Returns the replica.
    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }
}

impl SyncApplier for ReplicaApplier {
    fn checkpoint(&self) -> SyncResult<Revision> {
        Ok(self.replica.checkpoint().read()?)
    }

    fn apply_remote(&self, records: Vec<Record>) -> SyncResult<MergeReport> {
        Ok(self.replica.store().apply_remote(records)?)
    }

    fn pending_changes(&self) -> SyncResult<Vec<ChangeEntry>> {
        Ok(self.replica.change_log().drain())
    }

    fn acknowledge(&self, seqs: &[u64]) -> SyncResult<usize> {
        Ok(self.replica.change_log().clear_entries(seqs)?)
    }

    fn advance_checkpoint(&self, version: Revision) -> SyncResult<Revision> {
        let checkpoint = self.replica.checkpoint();
        let current = checkpoint.read()?;
        if version < current {
            tracing::warn!(
                current,
                latest_version = version,
                "server reported an older version; keeping checkpoint"
            );
            return Ok(current);
        }
        checkpoint.write(version)?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentsync_core::ReplicaConfig;
    use rentsync_protocol::Payload;
    use serde_json::json;

    fn applier() -> ReplicaApplier {
        ReplicaApplier::new(Arc::new(
            Replica::open_in_memory(ReplicaConfig::default()).unwrap(),
        ))
    }

    #[test]
    fn checkpoint_never_regresses() {
        let applier = applier();
        assert_eq!(applier.checkpoint().unwrap(), 0);
        assert_eq!(applier.advance_checkpoint(8).unwrap(), 8);
        assert_eq!(applier.advance_checkpoint(3).unwrap(), 8);
        assert_eq!(applier.checkpoint().unwrap(), 8);
    }

    #[test]
    fn pending_changes_until_acknowledged() {
        let applier = applier();
        let mut attrs = Payload::new();
        attrs.insert("name".into(), json!("Ana"));
        applier
            .replica()
            .store()
            .upsert_local("users", "u1", attrs)
            .unwrap();

        let pending = applier.pending_changes().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(applier.pending_changes().unwrap(), pending);
        assert_eq!(applier.acknowledge(&[pending[0].seq]).unwrap(), 1);
        assert!(applier.pending_changes().unwrap().is_empty());
    }
}
