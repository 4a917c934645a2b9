//! Server-side record store.

use parking_lot::RwLock;
use rentsync_protocol::{
    ChangeEntry, ChangeKind, EntryId, Payload, PullResponse, PushAck, Record, RecordId, Revision,
};
use std::collections::{HashMap, HashSet};

/// A record as the server keeps it.
#[derive(Debug, Clone)]
struct ServerRow {
    record: Record,
    /// Version at which the record was (re)created.
    created_version: Revision,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<RecordId, ServerRow>,
    version: Revision,
    applied: HashSet<EntryId>,
}

/// Authoritative record state.
///
/// Every accepted change bumps a global version and stamps it on the record
/// as its revision. Pushes are idempotent: entries whose id was already
/// applied are counted as duplicates and skipped.
#[derive(Debug, Default)]
pub struct ServerStore {
    inner: RwLock<Inner>,
}

impl ServerStore {
    /// Creates an empty store at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current version.
    pub fn version(&self) -> Revision {
        self.inner.read().version
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .rows
            .values()
            .filter(|r| !r.record.deleted)
            .count()
    }

    /// Returns true if there are no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a record, tombstones included.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.inner.read().rows.get(id).map(|r| r.record.clone())
    }

    /// Inserts or replaces records, each at a new version.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) -> Revision {
        let mut inner = self.inner.write();
        for mut record in records {
            inner.version += 1;
            record.revision = inner.version;
            let created_version = inner.version;
            inner.rows.insert(
                record.id.clone(),
                ServerRow {
                    record,
                    created_version,
                },
            );
        }
        inner.version
    }

    /// Returns up to `limit` changes after `since`, oldest first.
    ///
    /// `latestVersion` is the current version when everything fit, or the
    /// version of the last included change when the answer was cut, so the
    /// client picks up the rest on its next pull.
    pub fn changes_since(&self, since: Revision, limit: usize) -> PullResponse {
        let inner = self.inner.read();
        let mut rows: Vec<&ServerRow> = inner
            .rows
            .values()
            .filter(|r| r.record.revision > since)
            .collect();
        rows.sort_by_key(|r| r.record.revision);

        let truncated = rows.len() > limit;
        rows.truncate(limit);
        let latest_version = match rows.last() {
            Some(last) if truncated => last.record.revision,
            _ => inner.version.max(since),
        };

        let mut response = PullResponse::new(latest_version);
        for row in rows {
            let record = &row.record;
            if record.deleted {
                response.push_deleted(&record.collection, record.id.clone());
            } else if row.created_version > since {
                response.push_created(record);
            } else {
                response.push_updated(record);
            }
        }
        response
    }

    /// Applies pushed entries in order.
    pub fn apply(&self, changes: Vec<ChangeEntry>) -> PushAck {
        let mut inner = self.inner.write();
        let mut ack = PushAck::default();

        for entry in changes {
            if !inner.applied.insert(entry.entry_id) {
                ack.duplicates += 1;
                continue;
            }
            inner.version += 1;
            let version = inner.version;
            let row = apply_entry(inner.rows.remove(&entry.record_id), entry, version);
            inner.rows.insert(row.record.id.clone(), row);
            ack.accepted += 1;
        }

        if ack.accepted > 0 {
            tracing::debug!(
                accepted = ack.accepted,
                duplicates = ack.duplicates,
                version = inner.version,
                "applied push"
            );
        }
        ack
    }
}

fn apply_entry(existing: Option<ServerRow>, entry: ChangeEntry, version: Revision) -> ServerRow {
    let live = existing.filter(|r| !r.record.deleted);

    match entry.kind {
        ChangeKind::Delete => {
            let created_version = live.as_ref().map_or(version, |r| r.created_version);
            ServerRow {
                record: Record::tombstone(entry.record_id, entry.collection, version),
                created_version,
            }
        }
        ChangeKind::Create | ChangeKind::Update => {
            let (mut payload, created_version) = match live {
                Some(row) if entry.kind == ChangeKind::Update => {
                    (row.record.payload, row.created_version)
                }
                _ => (Payload::new(), version),
            };
            payload.extend(entry.delta);
            ServerRow {
                record: Record::new(entry.record_id, entry.collection, payload)
                    .with_revision(version),
                created_version,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn entry(id: &str, kind: ChangeKind, delta: serde_json::Value) -> ChangeEntry {
        ChangeEntry::new(RecordId::from(id), "cars", kind, attrs(delta))
    }

    #[test]
    fn versions_increase_per_change() {
        let store = ServerStore::new();
        let ack = store.apply(vec![
            entry("car1", ChangeKind::Create, json!({ "name": "Huracan" })),
            entry("car2", ChangeKind::Create, json!({ "name": "Panamera" })),
        ]);
        assert_eq!(ack.accepted, 2);
        assert_eq!(store.version(), 2);
        assert_eq!(store.get(&"car2".into()).unwrap().revision, 2);
    }

    #[test]
    fn update_merges_delta() {
        let store = ServerStore::new();
        store.apply(vec![entry(
            "car1",
            ChangeKind::Create,
            json!({ "name": "Huracan", "price": 580 }),
        )]);
        store.apply(vec![entry("car1", ChangeKind::Update, json!({ "price": 600 }))]);

        let car = store.get(&"car1".into()).unwrap();
        assert_eq!(car.attr("name"), Some(&json!("Huracan")));
        assert_eq!(car.attr("price"), Some(&json!(600)));
        assert_eq!(car.revision, 2);
    }

    #[test]
    fn replayed_entries_are_duplicates() {
        let store = ServerStore::new();
        let changes = vec![entry("car1", ChangeKind::Create, json!({ "name": "A" }))];
        assert_eq!(store.apply(changes.clone()).accepted, 1);

        let ack = store.apply(changes);
        assert_eq!(ack, PushAck { accepted: 0, duplicates: 1 });
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn pull_splits_created_updated_deleted() {
        let store = ServerStore::new();
        store.apply(vec![
            entry("car1", ChangeKind::Create, json!({ "name": "A" })),
            entry("car2", ChangeKind::Create, json!({ "name": "B" })),
        ]);
        let checkpoint = store.version();
        store.apply(vec![
            entry("car1", ChangeKind::Update, json!({ "name": "A2" })),
            entry("car2", ChangeKind::Delete, json!({})),
            entry("car3", ChangeKind::Create, json!({ "name": "C" })),
        ]);

        let response = store.changes_since(checkpoint, 100);
        let cars = &response.changes["cars"];
        assert_eq!(cars.created.len(), 1);
        assert_eq!(cars.updated.len(), 1);
        assert_eq!(cars.deleted, vec![RecordId::from("car2")]);
        assert_eq!(response.latest_version, 5);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn pull_is_cut_at_limit() {
        let store = ServerStore::new();
        store.seed((1..=5).map(|i| Record::new(format!("car{i}"), "cars", Payload::new())));

        let first = store.changes_since(0, 2);
        assert_eq!(first.len(), 2);
        assert_eq!(first.latest_version, 2);

        let rest = store.changes_since(first.latest_version, 10);
        assert_eq!(rest.len(), 3);
        assert_eq!(rest.latest_version, 5);
    }

    #[test]
    fn pull_with_nothing_new_echoes_version() {
        let store = ServerStore::new();
        store.seed([Record::new("car1", "cars", Payload::new())]);
        let response = store.changes_since(1, 10);
        assert!(response.is_empty());
        assert_eq!(response.latest_version, 1);
    }

    #[test]
    fn create_after_delete_starts_fresh() {
        let store = ServerStore::new();
        store.apply(vec![
            entry("car1", ChangeKind::Create, json!({ "name": "A", "price": 1 })),
            entry("car1", ChangeKind::Delete, json!({})),
            entry("car1", ChangeKind::Create, json!({ "name": "B" })),
        ]);
        let car = store.get(&"car1".into()).unwrap();
        assert!(!car.deleted);
        assert_eq!(car.attr("price"), None);
        assert_eq!(car.revision, 3);
    }
}
