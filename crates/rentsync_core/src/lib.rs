//! # rentsync core
//!
//! The local side of an offline-first replica.
//!
//! This crate provides:
//! - [`LocalStore`]: durable keyed records with revisions and tombstones
//! - [`ChangeLog`]: pending local mutations, cleared once acknowledged
//! - [`CheckpointStore`]: the last server version fully synchronized
//! - [`Schema`]: column types of the `cars` and `users` collections
//! - [`Replica`]: the three parts bundled over a locked directory
//!
//! Remote records are merged by revision: a pulled record replaces the local
//! one when its revision is equal or higher, and is dropped otherwise.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod checkpoint;
mod config;
mod dir;
mod error;
mod replica;
mod schema;
mod store;

pub use change_log::ChangeLog;
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::ReplicaConfig;
pub use dir::ReplicaDir;
pub use error::{CoreError, CoreResult};
pub use replica::Replica;
pub use schema::{CollectionSchema, Column, ColumnType, Schema, CARS, USERS};
pub use store::{LocalStore, MergeReport};
