//! List command implementation.

use super::open_replica;
use rentsync_core::Replica;
use rentsync_protocol::Record;
use std::path::Path;

/// Runs the list command.
pub fn run(
    path: &Path,
    collection: &str,
    include_deleted: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let replica = open_replica(path)?;
    let records = list(&replica, collection, include_deleted);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            for record in &records {
                println!("{}", format_record(record));
            }
            println!("({} records)", records.len());
        }
    }

    Ok(())
}

/// Returns the records of a collection sorted by id.
pub fn list(replica: &Replica, collection: &str, include_deleted: bool) -> Vec<Record> {
    replica
        .store()
        .list(|r| r.collection == collection && (include_deleted || !r.deleted))
}

fn format_record(record: &Record) -> String {
    if record.deleted {
        return format!("{} rev={} <deleted>", record.id, record.revision);
    }
    let attrs = serde_json::Value::Object(record.payload.clone());
    format!("{} rev={} {}", record.id, record.revision, attrs)
}
