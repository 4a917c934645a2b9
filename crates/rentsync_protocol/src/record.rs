//! Records.

use crate::types::{Payload, RecordId, Revision};
use serde::{Deserialize, Serialize};

/// A domain entity held by a replica, such as a car or a user.
///
/// Deletions are kept as tombstones (`deleted == true`) so they can be
/// compared by revision like any other state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier.
    pub id: RecordId,
    /// Collection (table) the record belongs to.
    pub collection: String,
    /// Attributes.
    #[serde(default)]
    pub payload: Payload,
    /// Server-assigned version; 0 for never-synchronized records.
    #[serde(default)]
    pub revision: Revision,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    /// Creates a live record at revision 0.
    pub fn new(id: impl Into<RecordId>, collection: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload,
            revision: 0,
            deleted: false,
        }
    }

    /// Creates a tombstone.
    pub fn tombstone(
        id: impl Into<RecordId>,
        collection: impl Into<String>,
        revision: Revision,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload: Payload::new(),
            revision,
            deleted: true,
        }
    }

    /// Sets the revision.
    #[must_use]
    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    /// Returns true if the record is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Returns one attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}

/// Where a write to the local store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A mutation made on this device; it is recorded in the change log.
    Local,
    /// State received from the server; it bypasses the change log.
    Remote,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_is_live_at_revision_zero() {
        let mut payload = Payload::new();
        payload.insert("brand".into(), json!("Audi"));
        let record = Record::new("car1", "cars", payload);

        assert_eq!(record.revision, 0);
        assert!(!record.is_tombstone());
        assert_eq!(record.attr("brand"), Some(&json!("Audi")));
        assert_eq!(record.attr("name"), None);
    }

    #[test]
    fn tombstone_has_empty_payload() {
        let record = Record::tombstone("car1", "cars", 9);
        assert!(record.is_tombstone());
        assert!(record.payload.is_empty());
        assert_eq!(record.revision, 9);
    }

    #[test]
    fn missing_fields_default_when_decoding() {
        let record: Record = serde_json::from_value(json!({
            "id": "u1",
            "collection": "users",
        }))
        .unwrap();
        assert_eq!(record.revision, 0);
        assert!(!record.deleted);
        assert!(record.payload.is_empty());
    }
}
