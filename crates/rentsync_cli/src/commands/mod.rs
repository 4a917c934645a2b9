//! CLI command implementations.

pub mod dump_changes;
pub mod inspect;
pub mod list;

use rentsync_core::{Replica, ReplicaConfig, Schema};
use std::path::Path;

/// Opens an existing replica for reading.
///
/// The replica is opened read-only under a shared lock: no file is created
/// or truncated, and a torn tail is skipped. Fails while the app holds the
/// replica.
pub fn open_replica(path: &Path) -> Result<Replica, Box<dyn std::error::Error>> {
    let config = ReplicaConfig::default()
        .with_create_if_missing(false)
        .with_read_only(true)
        .with_schema(Schema::permissive());
    let replica = Replica::open(path, config)?;
    tracing::info!(
        path = %path.display(),
        records = replica.store().len(),
        pending = replica.change_log().pending_count(),
        "replica opened for inspection"
    );
    Ok(replica)
}
