//! The local store: durable keyed records.
//!
//! Records are held in memory and persisted to an append-only framed log
//! that is replayed on open. Each write is one frame:
//!
//! - a record frame holds one CBOR-encoded [`Record`]
//! - a batch frame holds every record accepted from one pull
//!
//! A pulled batch is therefore either fully on disk or (torn) not at all,
//! and it is published to readers under a single write lock.

use crate::change_log::ChangeLog;
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use parking_lot::{Mutex, RwLock};
use rentsync_protocol::{
    decide, from_cbor, to_cbor, ChangeEntry, ChangeKind, MergeDecision, Origin, Payload, Record,
    RecordId,
};
use rentsync_storage::FramedLog;
use std::collections::HashMap;
use std::sync::Arc;

const FRAME_RECORD: u8 = 1;
const FRAME_BATCH: u8 = 2;

/// Magic of record log frames.
pub const RECORD_LOG_MAGIC: [u8; 4] = *b"RREC";

/// Outcome of merging a pulled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records that did not exist locally.
    pub inserted: usize,
    /// Records replaced by an equal or newer revision.
    pub overwritten: usize,
    /// Ids whose remote revision was older than the local one.
    pub stale: Vec<RecordId>,
}

impl MergeReport {
    /// Returns the number of records written.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.inserted + self.overwritten
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: MergeReport) {
        self.inserted += other.inserted;
        self.overwritten += other.overwritten;
        self.stale.extend(other.stale);
    }
}

/// Durable keyed record storage.
///
/// Readers never wait on the network: the record map is behind a
/// reader-writer lock that writers hold only to publish already-persisted
/// records. Writers are serialized among themselves.
pub struct LocalStore {
    records: RwLock<HashMap<RecordId, Record>>,
    log: FramedLog,
    change_log: Arc<ChangeLog>,
    schema: Schema,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Opens a store, replaying its log.
    ///
    /// Local writes are recorded in `change_log`.
    pub fn open(log: FramedLog, change_log: Arc<ChangeLog>, schema: Schema) -> CoreResult<Self> {
        let replay = log.recover()?;

        let mut records = HashMap::new();
        for frame in replay.frames {
            match frame.kind {
                FRAME_RECORD => {
                    let record: Record = from_cbor(&frame.payload)?;
                    records.insert(record.id.clone(), record);
                }
                FRAME_BATCH => {
                    let batch: Vec<Record> = from_cbor(&frame.payload)?;
                    for record in batch {
                        records.insert(record.id.clone(), record);
                    }
                }
                other => {
                    return Err(CoreError::invalid_format(format!(
                        "unknown record log frame kind {other} at offset {}",
                        frame.offset
                    )));
                }
            }
        }

        tracing::debug!(records = records.len(), "local store opened");

        Ok(Self {
            records: RwLock::new(records),
            log,
            change_log,
            schema,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns a record, tombstones included.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.records.read().get(id).cloned()
    }

    /// Returns a record or [`CoreError::NotFound`].
    pub fn require(&self, id: &RecordId) -> CoreResult<Record> {
        self.get(id).ok_or_else(|| CoreError::not_found(id))
    }

    /// Upserts a record.
    ///
    /// With [`Origin::Local`] the payload is checked against the schema and a
    /// change entry is appended to the change log before the record is
    /// written. The entry's kind is `Create` if the id was absent (or a
    /// tombstone), `Delete` if `record` is a tombstone, and `Update`
    /// otherwise; its delta holds the attributes that changed. A local write
    /// keeps the stored revision, since revisions come from the server.
    /// A local write that changes nothing is skipped.
    ///
    /// With [`Origin::Remote`] the record is written as is.
    ///
    /// Returns the appended change entry, if any.
    pub fn put(&self, mut record: Record, origin: Origin) -> CoreResult<Option<ChangeEntry>> {
        let _writer = self.write_lock.lock();
        let existing = self.get(&record.id);

        let entry = match origin {
            Origin::Remote => None,
            Origin::Local => {
                if !record.deleted {
                    self.schema.validate(&record.collection, &record.payload)?;
                }
                record.revision = existing.as_ref().map_or(0, |r| r.revision);

                let Some((kind, delta)) = local_change(existing.as_ref(), &record)? else {
                    return Ok(None);
                };
                let entry =
                    ChangeEntry::new(record.id.clone(), record.collection.clone(), kind, delta);
                Some(self.change_log.append(entry)?)
            }
        };

        self.log.append(FRAME_RECORD, &to_cbor(&record)?)?;
        self.records.write().insert(record.id.clone(), record);
        Ok(entry)
    }

    /// Merges records pulled from the server.
    ///
    /// Each record is written if no local record has its id, or if its
    /// revision is greater than or equal to the local one; otherwise it is
    /// dropped as stale. Accepted records are persisted in one frame and
    /// published under one lock, so readers see all of them or none.
    /// Merging never touches the change log.
    pub fn apply_remote(&self, batch: Vec<Record>) -> CoreResult<MergeReport> {
        let _writer = self.write_lock.lock();
        let mut report = MergeReport::default();
        let mut staged: HashMap<RecordId, Record> = HashMap::new();

        {
            let records = self.records.read();
            for remote in batch {
                let local = staged.get(&remote.id).or_else(|| records.get(&remote.id));
                match decide(local, &remote) {
                    MergeDecision::Insert => report.inserted += 1,
                    MergeDecision::Overwrite => report.overwritten += 1,
                    MergeDecision::Stale => {
                        tracing::warn!(
                            id = %remote.id,
                            remote_revision = remote.revision,
                            local_revision = local.map_or(0, |r| r.revision),
                            "dropping stale remote record"
                        );
                        report.stale.push(remote.id);
                        continue;
                    }
                }
                staged.insert(remote.id.clone(), remote);
            }
        }

        if staged.is_empty() {
            return Ok(report);
        }

        let accepted: Vec<Record> = staged.into_values().collect();
        self.log.append(FRAME_BATCH, &to_cbor(&accepted)?)?;

        let mut records = self.records.write();
        for record in accepted {
            records.insert(record.id.clone(), record);
        }
        drop(records);

        tracing::debug!(
            inserted = report.inserted,
            overwritten = report.overwritten,
            stale = report.stale.len(),
            "merged remote batch"
        );
        Ok(report)
    }

    /// Returns a snapshot of the records matching `predicate`, sorted by id.
    ///
    /// Every call evaluates the predicate against current state; the result
    /// is not updated by later writes.
    pub fn list<F>(&self, predicate: F) -> Vec<Record>
    where
        F: Fn(&Record) -> bool,
    {
        let mut out: Vec<Record> = self
            .records
            .read()
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Returns the live records of one collection, sorted by id.
    #[must_use]
    pub fn list_collection(&self, collection: &str) -> Vec<Record> {
        self.list(|r| r.collection == collection && !r.deleted)
    }

    /// Merges attributes into a record, creating it if needed.
    ///
    /// This is a local write: see [`put`](Self::put).
    pub fn upsert_local(
        &self,
        collection: &str,
        id: impl Into<RecordId>,
        attributes: Payload,
    ) -> CoreResult<Record> {
        let id = id.into();
        let mut record = match self.get(&id) {
            Some(existing) if !existing.deleted => existing,
            _ => Record::new(id.clone(), collection, Payload::new()),
        };
        record.collection = collection.to_string();
        record.payload.extend(attributes);

        self.put(record.clone(), Origin::Local)?;
        self.require(&id)
    }

    /// Deletes a record locally, leaving a tombstone.
    pub fn delete_local(&self, id: &RecordId) -> CoreResult<()> {
        let existing = self.require(id)?;
        if existing.deleted {
            return Ok(());
        }
        let tombstone = Record::tombstone(id.clone(), existing.collection, existing.revision);
        self.put(tombstone, Origin::Local)?;
        Ok(())
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().values().filter(|r| !r.deleted).count()
    }

    /// Returns true if there are no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of tombstones.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.records.read().values().filter(|r| r.deleted).count()
    }

    /// Returns the highest revision held.
    #[must_use]
    pub fn max_revision(&self) -> u64 {
        self.records
            .read()
            .values()
            .map(|r| r.revision)
            .max()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("records", &self.records.read().len())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Works out the change entry for a local write.
///
/// Returns `None` when the write changes nothing.
fn local_change(
    existing: Option<&Record>,
    record: &Record,
) -> CoreResult<Option<(ChangeKind, Payload)>> {
    let live = existing.filter(|r| !r.deleted);

    if record.deleted {
        return match existing {
            None => Err(CoreError::not_found(&record.id)),
            Some(r) if r.deleted => Ok(None),
            Some(_) => Ok(Some((ChangeKind::Delete, Payload::new()))),
        };
    }

    match live {
        None => Ok(Some((ChangeKind::Create, record.payload.clone()))),
        Some(current) => {
            let delta: Payload = record
                .payload
                .iter()
                .filter(|(k, v)| current.payload.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if delta.is_empty() {
                Ok(None)
            } else {
                Ok(Some((ChangeKind::Update, delta)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::CHANGE_LOG_MAGIC;
    use rentsync_storage::InMemoryBackend;
    use serde_json::json;

    struct Fixture {
        records: InMemoryBackend,
        changes: InMemoryBackend,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                records: InMemoryBackend::new(),
                changes: InMemoryBackend::new(),
            }
        }

        fn open(&self) -> (LocalStore, Arc<ChangeLog>) {
            let change_log = Arc::new(
                ChangeLog::open(FramedLog::new(
                    Box::new(self.changes.clone()),
                    CHANGE_LOG_MAGIC,
                ))
                .unwrap(),
            );
            let store = LocalStore::open(
                FramedLog::new(Box::new(self.records.clone()), RECORD_LOG_MAGIC),
                Arc::clone(&change_log),
                Schema::rentx(),
            )
            .unwrap();
            (store, change_log)
        }
    }

    fn attrs(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn car(id: &str, revision: u64, name: &str) -> Record {
        Record::new(id, "cars", attrs(json!({ "name": name }))).with_revision(revision)
    }

    #[test]
    fn get_and_require() {
        let (store, _) = Fixture::new().open();
        assert!(store.get(&RecordId::from("car1")).is_none());
        assert!(matches!(
            store.require(&RecordId::from("car1")),
            Err(CoreError::NotFound { .. })
        ));

        store.put(car("car1", 2, "RS5"), Origin::Remote).unwrap();
        assert_eq!(store.require(&RecordId::from("car1")).unwrap().revision, 2);
    }

    #[test]
    fn remote_put_bypasses_change_log() {
        let (store, changes) = Fixture::new().open();
        let entry = store.put(car("car1", 2, "RS5"), Origin::Remote).unwrap();
        assert!(entry.is_none());
        assert!(changes.is_empty());
    }

    #[test]
    fn local_put_records_create_then_update_delta() {
        let (store, changes) = Fixture::new().open();

        let created = store
            .put(car("car1", 0, "RS5"), Origin::Local)
            .unwrap()
            .unwrap();
        assert_eq!(created.kind, ChangeKind::Create);
        assert_eq!(created.delta["name"], json!("RS5"));

        let mut edited = store.require(&RecordId::from("car1")).unwrap();
        edited.payload.insert("price".into(), json!(340));
        let updated = store.put(edited, Origin::Local).unwrap().unwrap();
        assert_eq!(updated.kind, ChangeKind::Update);
        assert_eq!(updated.delta.len(), 1);
        assert_eq!(updated.delta["price"], json!(340));

        assert_eq!(changes.pending_count(), 2);
    }

    #[test]
    fn local_put_keeps_server_revision() {
        let (store, _) = Fixture::new().open();
        store.put(car("car1", 5, "RS5"), Origin::Remote).unwrap();
        store.put(car("car1", 99, "RS6"), Origin::Local).unwrap();
        assert_eq!(store.require(&RecordId::from("car1")).unwrap().revision, 5);
    }

    #[test]
    fn unchanged_local_put_is_skipped() {
        let (store, changes) = Fixture::new().open();
        store.put(car("car1", 1, "RS5"), Origin::Remote).unwrap();
        assert!(store
            .put(car("car1", 1, "RS5"), Origin::Local)
            .unwrap()
            .is_none());
        assert!(changes.is_empty());
    }

    #[test]
    fn local_put_is_schema_checked() {
        let (store, changes) = Fixture::new().open();
        let bad = Record::new("car1", "cars", attrs(json!({ "price": "free" })));
        assert!(store.put(bad, Origin::Local).is_err());
        assert!(store.get(&RecordId::from("car1")).is_none());
        assert!(changes.is_empty());
    }

    #[test]
    fn delete_local_writes_tombstone_and_entry() {
        let (store, changes) = Fixture::new().open();
        store.put(car("car1", 3, "RS5"), Origin::Remote).unwrap();

        store.delete_local(&RecordId::from("car1")).unwrap();
        let record = store.require(&RecordId::from("car1")).unwrap();
        assert!(record.deleted);
        assert_eq!(record.revision, 3);

        let pending = changes.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ChangeKind::Delete);

        store.delete_local(&RecordId::from("car1")).unwrap();
        assert_eq!(changes.pending_count(), 1);
        assert!(store.delete_local(&RecordId::from("nope")).is_err());
    }

    #[test]
    fn upsert_local_merges_attributes() {
        let (store, changes) = Fixture::new().open();
        store
            .upsert_local("users", "u1", attrs(json!({ "name": "Ana", "email": "a@x.io" })))
            .unwrap();
        let user = store
            .upsert_local("users", "u1", attrs(json!({ "driver_license": "123" })))
            .unwrap();

        assert_eq!(user.payload.len(), 3);
        let pending = changes.drain();
        assert_eq!(pending[0].kind, ChangeKind::Create);
        assert_eq!(pending[1].kind, ChangeKind::Update);
        assert_eq!(pending[1].delta.len(), 1);
    }

    #[test]
    fn recreating_a_tombstone_is_a_create() {
        let (store, changes) = Fixture::new().open();
        store.put(car("car1", 3, "RS5"), Origin::Remote).unwrap();
        store.delete_local(&RecordId::from("car1")).unwrap();
        let entry = store
            .put(car("car1", 0, "RS6"), Origin::Local)
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, ChangeKind::Create);
        assert_eq!(changes.pending_count(), 2);
    }

    #[test]
    fn apply_remote_respects_revisions() {
        let (store, _) = Fixture::new().open();
        store.put(car("car1", 5, "five"), Origin::Remote).unwrap();

        let report = store
            .apply_remote(vec![car("car1", 3, "three"), car("car2", 1, "new")])
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.overwritten, 0);
        assert_eq!(report.stale, vec![RecordId::from("car1")]);
        assert_eq!(
            store.require(&RecordId::from("car1")).unwrap().attr("name"),
            Some(&json!("five"))
        );

        let report = store.apply_remote(vec![car("car1", 7, "seven")]).unwrap();
        assert_eq!(report.overwritten, 1);
        assert_eq!(store.require(&RecordId::from("car1")).unwrap().revision, 7);
    }

    #[test]
    fn apply_remote_handles_duplicates_within_batch() {
        let (store, _) = Fixture::new().open();
        let report = store
            .apply_remote(vec![car("car1", 4, "four"), car("car1", 2, "two")])
            .unwrap();
        assert_eq!(report.applied(), 1);
        assert_eq!(report.stale.len(), 1);
        assert_eq!(store.require(&RecordId::from("car1")).unwrap().revision, 4);
    }

    #[test]
    fn remote_tombstone_hides_record() {
        let (store, _) = Fixture::new().open();
        store.apply_remote(vec![car("car1", 1, "RS5")]).unwrap();
        store
            .apply_remote(vec![Record::tombstone("car1", "cars", 2)])
            .unwrap();
        assert!(store.list_collection("cars").is_empty());
        assert_eq!(store.tombstone_count(), 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn list_is_a_sorted_snapshot() {
        let (store, _) = Fixture::new().open();
        store
            .apply_remote(vec![car("car2", 1, "b"), car("car1", 1, "a")])
            .unwrap();

        let snapshot = store.list(|r| r.collection == "cars");
        store.apply_remote(vec![car("car3", 1, "c")]).unwrap();

        let ids: Vec<&str> = snapshot.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["car1", "car2"]);
        assert_eq!(store.list_collection("cars").len(), 3);
    }

    #[test]
    fn state_survives_reopen() {
        let fixture = Fixture::new();
        {
            let (store, _) = fixture.open();
            store.apply_remote(vec![car("car1", 4, "RS5")]).unwrap();
            store.put(car("car2", 0, "local"), Origin::Local).unwrap();
            store.delete_local(&RecordId::from("car1")).unwrap();
        }

        let (store, changes) = fixture.open();
        assert!(store.require(&RecordId::from("car1")).unwrap().deleted);
        assert_eq!(store.len(), 1);
        assert_eq!(store.max_revision(), 4);
        assert_eq!(changes.pending_count(), 2);
    }

    #[test]
    fn torn_batch_is_invisible_after_reopen() {
        let fixture = Fixture::new();
        {
            let (store, _) = fixture.open();
            store.apply_remote(vec![car("car1", 1, "RS5")]).unwrap();
            store
                .apply_remote(vec![car("car2", 2, "b"), car("car3", 2, "c")])
                .unwrap();
        }

        let mut bytes = fixture.records.data();
        bytes.truncate(bytes.len() - 1);
        let torn = Fixture {
            records: InMemoryBackend::with_data(bytes),
            changes: fixture.changes.clone(),
        };
        let (store, _) = torn.open();
        assert_eq!(store.len(), 1);
        assert!(store.get(&RecordId::from("car2")).is_none());
    }
}
