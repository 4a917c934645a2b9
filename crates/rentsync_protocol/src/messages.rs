//! Pull and push messages.
//!
//! Pull answers group changes per collection the way the server sends them:
//!
//! ```json
//! {
//!   "changes": {
//!     "cars": { "created": [...], "updated": [...], "deleted": ["id", ...] }
//!   },
//!   "latestVersion": 12
//! }
//! ```

use crate::change::ChangeEntry;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::Record;
use crate::types::{Payload, RecordId, Revision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query parameter carrying the pull checkpoint.
const LAST_PULLED_VERSION: &str = "lastPulledVersion";

/// Request for all changes after a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Last version the client has fully synchronized; 0 on first sync.
    #[serde(default)]
    pub last_pulled_version: Revision,
}

impl PullRequest {
    /// Creates a pull request.
    #[must_use]
    pub fn new(last_pulled_version: Revision) -> Self {
        Self {
            last_pulled_version,
        }
    }

    /// Renders the request as a URL query string.
    #[must_use]
    pub fn to_query(&self) -> String {
        format!("{LAST_PULLED_VERSION}={}", self.last_pulled_version)
    }

    /// Parses a URL query string.
    ///
    /// A missing parameter, an empty value and `null` all mean version 0.
    pub fn from_query(query: &str) -> ProtocolResult<Self> {
        let mut last_pulled_version = 0;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key != LAST_PULLED_VERSION {
                continue;
            }
            last_pulled_version = match value {
                "" | "null" | "undefined" => 0,
                v => v.parse().map_err(|_| {
                    ProtocolError::InvalidQuery(format!("{LAST_PULLED_VERSION}={v}"))
                })?,
            };
        }
        Ok(Self {
            last_pulled_version,
        })
    }
}

/// A created or updated row as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    /// Record id.
    pub id: RecordId,
    /// Row version; rows without one take the response's `latestVersion`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Remaining columns.
    #[serde(flatten)]
    pub attributes: Payload,
}

impl RemoteRow {
    /// Builds a row from a live record.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            revision: Some(record.revision),
            attributes: record.payload.clone(),
        }
    }

    fn into_record(self, collection: &str, latest_version: Revision) -> Record {
        // Bookkeeping columns such as `_status` and `_changed` are not
        // attributes.
        let payload = self
            .attributes
            .into_iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .collect();
        Record::new(self.id, collection, payload)
            .with_revision(self.revision.unwrap_or(latest_version))
    }
}

/// Changes for one collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableChanges {
    /// Rows created since the requested version.
    #[serde(default)]
    pub created: Vec<RemoteRow>,
    /// Rows updated since the requested version.
    #[serde(default)]
    pub updated: Vec<RemoteRow>,
    /// Ids deleted since the requested version.
    #[serde(default)]
    pub deleted: Vec<RecordId>,
}

impl TableChanges {
    /// Returns the number of rows and ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Changes grouped by collection name.
pub type ChangeSet = BTreeMap<String, TableChanges>;

/// Answer to a [`PullRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changes per collection.
    #[serde(default)]
    pub changes: ChangeSet,
    /// Version the client should store as its checkpoint after this cycle.
    pub latest_version: Revision,
}

impl PullResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new(latest_version: Revision) -> Self {
        Self {
            changes: ChangeSet::new(),
            latest_version,
        }
    }

    /// Adds a record as created.
    pub fn push_created(&mut self, record: &Record) {
        self.table(&record.collection)
            .created
            .push(RemoteRow::from_record(record));
    }

    /// Adds a record as updated.
    pub fn push_updated(&mut self, record: &Record) {
        self.table(&record.collection)
            .updated
            .push(RemoteRow::from_record(record));
    }

    /// Adds a deleted id.
    pub fn push_deleted(&mut self, collection: &str, id: RecordId) {
        self.table(collection).deleted.push(id);
    }

    fn table(&mut self, collection: &str) -> &mut TableChanges {
        self.changes.entry(collection.to_string()).or_default()
    }

    /// Returns the total number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.values().map(TableChanges::len).sum()
    }

    /// Returns true if the response carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the response into records.
    ///
    /// Deleted ids become tombstones at `latest_version`.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.len());
        for (collection, table) in &self.changes {
            for row in table.created.iter().chain(&table.updated) {
                records.push(row.clone().into_record(collection, self.latest_version));
            }
            for id in &table.deleted {
                records.push(Record::tombstone(
                    id.clone(),
                    collection.as_str(),
                    self.latest_version,
                ));
            }
        }
        records
    }
}

/// Batch of pending local changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushRequest {
    /// Coalesced change entries, in seq order.
    pub changes: Vec<ChangeEntry>,
}

impl PushRequest {
    /// Creates a push request.
    #[must_use]
    pub fn new(changes: Vec<ChangeEntry>) -> Self {
        Self { changes }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if there is nothing to push.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Acknowledgement of a whole [`PushRequest`].
///
/// There is no per-entry status: either the batch is acknowledged or the
/// push failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PushAck {
    /// Entries applied by the server.
    #[serde(default)]
    pub accepted: usize,
    /// Entries the server had already applied.
    #[serde(default)]
    pub duplicates: usize,
}
