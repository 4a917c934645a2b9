//! # rentsync sync server
//!
//! Reference sync server for rentsync replicas.
//!
//! This crate provides:
//! - Pull and push handlers speaking the JSON wire format
//! - A versioned record store that dedups replayed entries
//! - Routing for `GET /cars/sync/pull` and `POST /users/sync`
//!
//! # Protocol
//!
//! 1. Client pulls with `?lastPulledVersion=N`
//! 2. Server answers every change after `N`, grouped per collection into
//!    created, updated and deleted, plus `latestVersion`
//! 3. Client pushes its pending changes; each accepted entry gets the next
//!    version
//!
//! Replaying a push is harmless: entries are keyed by their id and applied
//! once.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod server;
mod store;

pub use config::{ServerConfig, PULL_PATH, PUSH_PATH};
pub use error::{ServerError, ServerResult};
pub use server::SyncServer;
pub use store::ServerStore;
