//! Inspect command implementation.

use super::open_replica;
use rentsync_core::Replica;
use rentsync_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Replica inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Replica path.
    pub path: String,
    /// Record log size in bytes.
    pub records_size: u64,
    /// Change log size in bytes.
    pub changes_size: u64,
    /// Number of live records.
    pub record_count: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Highest revision held.
    pub max_revision: u64,
    /// Number of pending change log entries.
    pub pending_changes: usize,
    /// Last fully synchronized server version.
    pub checkpoint: u64,
    /// Live records per collection (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<BTreeMap<String, usize>>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_collections: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let replica = open_replica(path)?;
    let result = inspect(&replica, show_collections)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for an open replica.
pub fn inspect(
    replica: &Replica,
    show_collections: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = replica.store();
    let (path, records_size, changes_size) = match replica.dir() {
        Some(dir) => (
            dir.path().display().to_string(),
            file_size(&dir.records_path())?,
            file_size(&dir.changes_path())?,
        ),
        None => ("<memory>".to_string(), 0, 0),
    };

    let collections = show_collections.then(|| {
        let mut counts = BTreeMap::new();
        for record in store.list(|r| !r.deleted) {
            *counts.entry(record.collection).or_insert(0) += 1;
        }
        counts
    });

    Ok(InspectResult {
        path,
        records_size,
        changes_size,
        record_count: store.len(),
        tombstone_count: store.tombstone_count(),
        max_revision: store.max_revision(),
        pending_changes: replica.change_log().pending_count(),
        checkpoint: replica.checkpoint().read()?,
        collections,
    })
}

fn file_size(path: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(0);
    }
    Ok(FileBackend::open_read_only(path)?.size()?)
}

fn print_text_output(result: &InspectResult) {
    println!("rentsync Replica Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Record log:  {}", format_size(result.records_size));
    println!("  Change log:  {}", format_size(result.changes_size));
    println!();
    println!("Records:");
    println!("  Live records:  {}", result.record_count);
    println!("  Tombstones:    {}", result.tombstone_count);
    println!("  Max revision:  {}", result.max_revision);
    println!();
    println!("Sync:");
    println!("  Checkpoint:       {}", result.checkpoint);
    println!("  Pending changes:  {}", result.pending_changes);

    if let Some(collections) = &result.collections {
        println!();
        println!("Collections:");
        for (name, count) in collections {
            println!("  {name}: {count} records");
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentsync_core::ReplicaConfig;
    use rentsync_protocol::{Payload, Record};
    use tempfile::tempdir;

    #[test]
    fn counts_records_and_pending_changes() {
        let temp = tempdir().unwrap();
        {
            let replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
            replica
                .store()
                .apply_remote(vec![
                    Record::new("car1", "cars", Payload::new()).with_revision(3),
                    Record::tombstone("car2", "cars", 4),
                ])
                .unwrap();
            replica
                .store()
                .upsert_local("users", "u1", Payload::new())
                .unwrap();
            replica.checkpoint().write(4).unwrap();
        }

        let replica = open_replica(temp.path()).unwrap();
        let result = inspect(&replica, true).unwrap();
        assert_eq!(result.record_count, 2);
        assert_eq!(result.tombstone_count, 1);
        assert_eq!(result.max_revision, 4);
        assert_eq!(result.pending_changes, 1);
        assert_eq!(result.checkpoint, 4);
        assert!(result.records_size > 0);
        let collections = result.collections.unwrap();
        assert_eq!(collections["cars"], 1);
        assert_eq!(collections["users"], 1);
    }

    #[test]
    fn inspecting_leaves_files_untouched() {
        let temp = tempdir().unwrap();
        {
            let replica = Replica::open(temp.path(), ReplicaConfig::default()).unwrap();
            replica
                .store()
                .upsert_local("users", "u1", Payload::new())
                .unwrap();
        }
        let records_path = temp.path().join("records.log");
        let mut bytes = std::fs::read(&records_path).unwrap();
        bytes.truncate(bytes.len() - 1);
        std::fs::write(&records_path, &bytes).unwrap();

        let replica = open_replica(temp.path()).unwrap();
        let result = inspect(&replica, false).unwrap();
        assert_eq!(result.record_count, 0);
        assert_eq!(result.pending_changes, 1);
        assert_eq!(result.records_size, bytes.len() as u64);
        drop(replica);

        assert_eq!(std::fs::read(&records_path).unwrap(), bytes);
        assert!(!temp.path().join("CHECKPOINT").exists());
    }

    #[test]
    fn missing_replica_is_an_error() {
        let temp = tempdir().unwrap();
        assert!(open_replica(&temp.path().join("nope")).is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
