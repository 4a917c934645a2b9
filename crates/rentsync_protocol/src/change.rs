//! Change entries and coalescing.

use crate::types::{EntryId, Payload, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The record did not exist locally before.
    Create,
    /// Attributes of an existing record changed.
    Update,
    /// The record was deleted.
    Delete,
}

/// One pending local mutation.
///
/// Entries are ordered by `seq`, which the change log assigns on append and
/// which serves as the logical creation time. An entry is never modified
/// after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Idempotency key for the server.
    pub entry_id: EntryId,
    /// Position in the change log.
    pub seq: u64,
    /// Wall-clock creation time in milliseconds. Informational only.
    pub created_at_ms: u64,
    /// Target record.
    pub record_id: RecordId,
    /// Collection of the target record.
    pub collection: String,
    /// Operation kind.
    pub kind: ChangeKind,
    /// Changed attributes. Empty for deletes.
    #[serde(default)]
    pub delta: Payload,
}

impl ChangeEntry {
    /// Creates an entry with a fresh id and the current time.
    ///
    /// `seq` is 0 until the change log assigns one.
    pub fn new(
        record_id: impl Into<RecordId>,
        collection: impl Into<String>,
        kind: ChangeKind,
        delta: Payload,
    ) -> Self {
        Self {
            entry_id: EntryId::generate(),
            seq: 0,
            created_at_ms: now_ms(),
            record_id: record_id.into(),
            collection: collection.into(),
            kind,
            delta,
        }
    }

    /// Returns true if this entry deletes its record.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Collapses entries for the same record into one.
///
/// For each record id the result holds a single entry whose delta is the
/// union of the individual deltas (later values win), carrying the entry id
/// and seq of the last entry. Its kind is:
///
/// - `Delete` if the last entry deletes the record
/// - `Create` if the first entry created it, or it was deleted and then
///   written again
/// - `Update` otherwise
///
/// A delete discards the delta accumulated before it. The output is sorted
/// by seq.
///
/// ```rust
/// use rentsync_protocol::{coalesce, ChangeEntry, ChangeKind, Payload};
/// use serde_json::json;
///
/// let mut name = Payload::new();
/// name.insert("name".into(), json!("Panamera"));
/// let mut price = Payload::new();
/// price.insert("price".into(), json!(340));
///
/// let mut first = ChangeEntry::new("car1", "cars", ChangeKind::Update, name);
/// first.seq = 1;
/// let mut second = ChangeEntry::new("car1", "cars", ChangeKind::Update, price);
/// second.seq = 2;
///
/// let merged = coalesce(vec![first, second]);
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].delta.len(), 2);
/// assert_eq!(merged[0].seq, 2);
/// ```
#[must_use]
pub fn coalesce(mut entries: Vec<ChangeEntry>) -> Vec<ChangeEntry> {
    entries.sort_by_key(|e| e.seq);

    let mut slots: HashMap<RecordId, usize> = HashMap::new();
    let mut merged: Vec<(ChangeEntry, bool)> = Vec::new();

    for entry in entries {
        match slots.get(&entry.record_id).copied() {
            None => {
                slots.insert(entry.record_id.clone(), merged.len());
                let created = entry.kind == ChangeKind::Create;
                merged.push((entry, created));
            }
            Some(slot) => {
                let (current, created) = &mut merged[slot];
                match entry.kind {
                    ChangeKind::Delete => {
                        current.delta.clear();
                        current.kind = ChangeKind::Delete;
                        *created = false;
                    }
                    ChangeKind::Create | ChangeKind::Update => {
                        if current.kind == ChangeKind::Delete || entry.kind == ChangeKind::Create
                        {
                            *created = true;
                        }
                        current.delta.extend(entry.delta);
                        current.kind = if *created {
                            ChangeKind::Create
                        } else {
                            ChangeKind::Update
                        };
                    }
                }
                current.entry_id = entry.entry_id;
                current.seq = entry.seq;
                current.created_at_ms = entry.created_at_ms;
            }
        }
    }

    let mut out: Vec<ChangeEntry> = merged.into_iter().map(|(entry, _)| entry).collect();
    out.sort_by_key(|e| e.seq);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(
        seq: u64,
        id: &str,
        kind: ChangeKind,
        fields: &[(&str, serde_json::Value)],
    ) -> ChangeEntry {
        let mut delta = Payload::new();
        for (k, v) in fields {
            delta.insert((*k).to_string(), v.clone());
        }
        let mut e = ChangeEntry::new(id, "cars", kind, delta);
        e.seq = seq;
        e
    }

    #[test]
    fn two_updates_merge_into_one() {
        let a = entry(1, "car1", ChangeKind::Update, &[("name", json!("Panamera"))]);
        let b = entry(2, "car1", ChangeKind::Update, &[("price", json!(340))]);
        let last_id = b.entry_id;

        let out = coalesce(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Update);
        assert_eq!(out[0].entry_id, last_id);
        assert_eq!(out[0].delta["name"], json!("Panamera"));
        assert_eq!(out[0].delta["price"], json!(340));
    }

    #[test]
    fn later_value_wins() {
        let a = entry(1, "car1", ChangeKind::Update, &[("price", json!(300))]);
        let b = entry(2, "car1", ChangeKind::Update, &[("price", json!(340))]);
        let out = coalesce(vec![b, a]);
        assert_eq!(out[0].delta["price"], json!(340));
    }

    #[test]
    fn create_then_update_stays_create() {
        let a = entry(1, "car1", ChangeKind::Create, &[("name", json!("RS5"))]);
        let b = entry(2, "car1", ChangeKind::Update, &[("period", json!("Ao dia"))]);
        let out = coalesce(vec![a, b]);
        assert_eq!(out[0].kind, ChangeKind::Create);
        assert_eq!(out[0].delta.len(), 2);
    }

    #[test]
    fn update_then_delete_is_delete() {
        let a = entry(1, "car1", ChangeKind::Update, &[("name", json!("RS5"))]);
        let b = entry(2, "car1", ChangeKind::Delete, &[]);
        let out = coalesce(vec![a, b]);
        assert_eq!(out[0].kind, ChangeKind::Delete);
        assert!(out[0].delta.is_empty());
    }

    #[test]
    fn delete_then_write_is_create_with_fresh_delta() {
        let a = entry(1, "car1", ChangeKind::Update, &[("name", json!("old"))]);
        let b = entry(2, "car1", ChangeKind::Delete, &[]);
        let c = entry(3, "car1", ChangeKind::Update, &[("brand", json!("Audi"))]);
        let out = coalesce(vec![a, b, c]);
        assert_eq!(out[0].kind, ChangeKind::Create);
        assert!(!out[0].delta.contains_key("name"));
        assert_eq!(out[0].delta["brand"], json!("Audi"));
    }

    #[test]
    fn distinct_records_kept_in_seq_order() {
        let a = entry(1, "car1", ChangeKind::Update, &[("name", json!("a"))]);
        let b = entry(2, "car2", ChangeKind::Update, &[("name", json!("b"))]);
        let c = entry(3, "car1", ChangeKind::Update, &[("name", json!("c"))]);
        let out = coalesce(vec![a, b, c]);
        let ids: Vec<&str> = out.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, vec!["car2", "car1"]);
    }

    #[test]
    fn empty_input() {
        assert!(coalesce(Vec::new()).is_empty());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let e = entry(4, "car1", ChangeKind::Delete, &[]);
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["recordId"], json!("car1"));
        assert_eq!(value["kind"], json!("delete"));
        assert!(value.get("entryId").is_some());
    }
}
