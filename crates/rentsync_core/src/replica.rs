//! The replica handle.

use crate::change_log::{ChangeLog, CHANGE_LOG_MAGIC};
use crate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::config::ReplicaConfig;
use crate::dir::ReplicaDir;
use crate::error::CoreResult;
use crate::store::{LocalStore, RECORD_LOG_MAGIC};
use rentsync_storage::{FileBackend, FramedLog, InMemoryBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// A local replica: store, change log and checkpoint.
///
/// The handle is passed explicitly to whatever reads or writes records and
/// to the sync engine; there is no global instance. All three parts are
/// shared through `Arc`, so a UI layer and the engine can hold them at the
/// same time.
///
/// ```rust
/// use rentsync_core::{Replica, ReplicaConfig};
/// use rentsync_protocol::Payload;
/// use serde_json::json;
///
/// let replica = Replica::open_in_memory(ReplicaConfig::default()).unwrap();
/// let mut attrs = Payload::new();
/// attrs.insert("name".into(), json!("Ana"));
/// replica.store().upsert_local("users", "u1", attrs).unwrap();
///
/// assert_eq!(replica.change_log().pending_count(), 1);
/// assert_eq!(replica.checkpoint().read().unwrap(), 0);
/// ```
pub struct Replica {
    dir: Option<ReplicaDir>,
    read_only: bool,
    store: Arc<LocalStore>,
    change_log: Arc<ChangeLog>,
    checkpoint: Arc<dyn CheckpointStore>,
}

impl Replica {
    /// Opens or creates a replica directory.
    ///
    /// The directory stays locked until the replica is dropped. With
    /// `read_only` set the lock is shared, nothing is created and no file is
    /// modified.
    pub fn open(path: &Path, config: ReplicaConfig) -> CoreResult<Self> {
        let (dir, records, changes) = if config.read_only {
            let dir = ReplicaDir::open_shared(path)?;
            let records = FileBackend::open_read_only(&dir.records_path())?;
            let changes = FileBackend::open_read_only(&dir.changes_path())?;
            (dir, records, changes)
        } else {
            let dir = ReplicaDir::open(path, config.create_if_missing)?;
            let records = FileBackend::open(&dir.records_path())?;
            let changes = FileBackend::open(&dir.changes_path())?;
            (dir, records, changes)
        };
        let checkpoint = Arc::new(FileCheckpointStore::open(&dir.checkpoint_path())?);

        let mut replica =
            Self::open_with_backends(Box::new(records), Box::new(changes), checkpoint, config)?;
        tracing::info!(
            path = %dir.path().display(),
            read_only = replica.read_only,
            records = replica.store.len(),
            pending = replica.change_log.pending_count(),
            "replica opened"
        );
        replica.dir = Some(dir);
        Ok(replica)
    }

    /// Creates a replica that lives in memory only.
    pub fn open_in_memory(config: ReplicaConfig) -> CoreResult<Self> {
        Self::open_with_backends(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
            Arc::new(MemoryCheckpointStore::new()),
            config,
        )
    }

    /// Opens a replica over explicit backends.
    pub fn open_with_backends(
        records: Box<dyn StorageBackend>,
        changes: Box<dyn StorageBackend>,
        checkpoint: Arc<dyn CheckpointStore>,
        config: ReplicaConfig,
    ) -> CoreResult<Self> {
        let framed = |backend, magic| {
            FramedLog::new(backend, magic)
                .with_sync_on_write(config.sync_on_write)
                .with_read_only(config.read_only)
        };
        let change_log = Arc::new(ChangeLog::open(framed(changes, CHANGE_LOG_MAGIC))?);
        let store = Arc::new(LocalStore::open(
            framed(records, RECORD_LOG_MAGIC),
            Arc::clone(&change_log),
            config.schema.clone(),
        )?);

        Ok(Self {
            dir: None,
            read_only: config.read_only,
            store,
            change_log,
            checkpoint,
        })
    }

    /// Returns the local store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the change log.
    #[must_use]
    pub fn change_log(&self) -> &Arc<ChangeLog> {
        &self.change_log
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn checkpoint(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoint
    }

    /// Returns the directory path for on-disk replicas.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(ReplicaDir::path)
    }

    /// Returns true if the replica was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the locked directory for on-disk replicas.
    #[must_use]
    pub fn dir(&self) -> Option<&ReplicaDir> {
        self.dir.as_ref()
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("path", &self.path())
            .field("store", &self.store)
            .field("change_log", &self.change_log)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use rentsync_protocol::{Origin, Payload, Record, RecordId};
    use serde_json::json;
    use tempfile::tempdir;

    fn car(id: &str, revision: u64) -> Record {
        let mut payload = Payload::new();
        payload.insert("name".into(), json!("Huracan"));
        Record::new(id, "cars", payload).with_revision(revision)
    }

    #[test]
    fn in_memory_has_no_path() {
        let replica = Replica::open_in_memory(ReplicaConfig::default()).unwrap();
        assert!(replica.path().is_none());
        assert!(replica.store().is_empty());
    }

    #[test]
    fn reopen_restores_everything() {
        let temp = tempdir().unwrap();
        {
            let replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
            assert_eq!(replica.path(), Some(temp.path()));
            replica.store().apply_remote(vec![car("car1", 3)]).unwrap();
            replica
                .store()
                .put(car("car2", 0), Origin::Local)
                .unwrap();
            replica.checkpoint().write(3).unwrap();
        }

        let replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
        assert_eq!(replica.store().len(), 2);
        assert_eq!(
            replica.store().require(&RecordId::from("car1")).unwrap().revision,
            3
        );
        assert_eq!(replica.change_log().pending_count(), 1);
        assert_eq!(replica.checkpoint().read().unwrap(), 3);
    }

    #[test]
    fn read_only_open_changes_nothing_on_disk() {
        let temp = tempdir().unwrap();
        {
            let replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
            replica.store().apply_remote(vec![car("car1", 3)]).unwrap();
            replica.store().put(car("car2", 0), Origin::Local).unwrap();
        }
        let changes_path = temp.path().join("changes.log");
        let mut bytes = std::fs::read(&changes_path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&changes_path, &bytes).unwrap();

        let config = ReplicaConfig::default().with_read_only(true);
        let replica = Replica::open(temp.path(), config).unwrap();
        assert!(replica.is_read_only());
        assert_eq!(replica.store().len(), 2);
        assert_eq!(replica.change_log().pending_count(), 0);
        assert!(replica.store().put(car("car3", 0), Origin::Local).is_err());
        assert!(replica.checkpoint().read().is_ok());
        drop(replica);

        assert_eq!(std::fs::read(&changes_path).unwrap(), bytes);
        assert!(!temp.path().join("CHECKPOINT").exists());
    }

    #[test]
    fn directory_is_exclusive() {
        let temp = tempdir().unwrap();
        let _replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
        assert!(matches!(
            Replica::open(temp.path(), ReplicaConfig::default()),
            Err(CoreError::ReplicaLocked)
        ));
    }
}
