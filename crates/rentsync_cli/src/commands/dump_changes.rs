//! Dump changes command implementation.

use super::open_replica;
use rentsync_core::Replica;
use rentsync_protocol::{coalesce, ChangeEntry, ChangeKind};
use serde::Serialize;
use std::path::Path;

/// Change log entry representation for output.
#[derive(Debug, Serialize)]
pub struct ChangeInfo {
    /// Position in the change log.
    pub seq: u64,
    /// Entry id.
    pub entry_id: String,
    /// Creation time, milliseconds since the epoch.
    pub created_at_ms: u64,
    /// Collection of the record.
    pub collection: String,
    /// Record id.
    pub record_id: String,
    /// Mutation kind.
    pub kind: ChangeKind,
    /// Changed attribute names.
    pub fields: Vec<String>,
}

impl From<&ChangeEntry> for ChangeInfo {
    fn from(entry: &ChangeEntry) -> Self {
        Self {
            seq: entry.seq,
            entry_id: entry.entry_id.as_uuid().to_string(),
            created_at_ms: entry.created_at_ms,
            collection: entry.collection.clone(),
            record_id: entry.record_id.to_string(),
            kind: entry.kind,
            fields: entry.delta.keys().cloned().collect(),
        }
    }
}

/// Runs the dump-changes command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    coalesced: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let replica = open_replica(path)?;
    let changes = collect(&replica, limit, coalesced);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        _ => {
            print_text_output(&changes);
        }
    }

    Ok(())
}

/// Returns pending entries in seq order, optionally coalesced.
pub fn collect(replica: &Replica, limit: Option<usize>, coalesced: bool) -> Vec<ChangeInfo> {
    let mut entries = replica.change_log().drain();
    if coalesced {
        entries = coalesce(entries);
    }
    entries
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(ChangeInfo::from)
        .collect()
}

fn print_text_output(changes: &[ChangeInfo]) {
    println!("Pending changes");
    println!("===============");
    println!();

    for change in changes {
        println!(
            "[{}] {:?} {}/{} fields={}",
            change.seq,
            change.kind,
            change.collection,
            change.record_id,
            change.fields.join(",")
        );
    }

    println!();
    println!("Total: {} entries", changes.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentsync_core::ReplicaConfig;
    use rentsync_protocol::{Payload, RecordId};
    use serde_json::json;

    fn replica_with_edits() -> Replica {
        let replica = Replica::open_in_memory(ReplicaConfig::default()).unwrap();
        let store = replica.store();
        let mut attrs = Payload::new();
        attrs.insert("name".into(), json!("Ana"));
        store.upsert_local("users", "u1", attrs).unwrap();
        let mut attrs = Payload::new();
        attrs.insert("email".into(), json!("ana@rentx.io"));
        store.upsert_local("users", "u1", attrs).unwrap();
        store.upsert_local("users", "u2", Payload::new()).unwrap();
        store.delete_local(&RecordId::from("u2")).unwrap();
        replica
    }

    #[test]
    fn dumps_entries_in_order() {
        let replica = replica_with_edits();
        let changes = collect(&replica, None, false);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].kind, ChangeKind::Create);
        assert_eq!(changes[1].fields, ["email"]);
        assert_eq!(changes[3].kind, ChangeKind::Delete);
        assert!(changes.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn limit_and_coalesce() {
        let replica = replica_with_edits();
        assert_eq!(collect(&replica, Some(2), false).len(), 2);

        let coalesced = collect(&replica, None, true);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0].record_id, "u1");
        assert_eq!(coalesced[0].fields, ["email", "name"]);
        assert_eq!(coalesced[1].kind, ChangeKind::Delete);
    }
}
