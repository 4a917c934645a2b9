//! # rentsync protocol
//!
//! Data model and wire types shared by the replica, the sync engine and the
//! sync server.
//!
//! This crate provides:
//! - [`Record`] with its revision and tombstone flag
//! - [`ChangeEntry`] for pending local mutations, and [`coalesce`]
//! - The revision merge rule ([`decide`])
//! - Pull and push messages as the server speaks them
//! - CBOR (on disk) and JSON (on the wire) codecs
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
mod error;
mod merge;
mod messages;
mod record;
mod types;

pub use change::{coalesce, ChangeEntry, ChangeKind};
pub use codec::{from_cbor, from_json, to_cbor, to_json};
pub use error::{ProtocolError, ProtocolResult};
pub use merge::{decide, MergeDecision};
pub use messages::{
    ChangeSet, PullRequest, PullResponse, PushAck, PushRequest, RemoteRow, TableChanges,
};
pub use record::{Origin, Record};
pub use types::{EntryId, Payload, RecordId, Revision};
