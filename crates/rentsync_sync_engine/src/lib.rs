//! # rentsync sync engine
//!
//! Synchronizes a local replica with the rental server.
//!
//! This crate provides:
//! - Sync state machine (idle → pulling → merging → pushing → synced)
//! - Single-flight `synchronize()` with typed failures
//! - Retry with exponential backoff, driven by the caller
//! - Remote gateway abstraction with HTTP and mock implementations
//! - Connectivity and foreground triggers
//!
//! ## Cycle
//!
//! 1. Read the checkpoint and pull every change after it
//! 2. Merge pulled records by revision
//! 3. Coalesce pending local changes and push them in batches, clearing each
//!    acknowledged batch
//! 4. Store the pull's `latestVersion`
//!
//! ## Key Invariants
//!
//! - Pull always happens before push
//! - A failed pull changes nothing locally
//! - A failed push batch leaves its entries, later batches and the
//!   checkpoint untouched
//! - The checkpoint only moves after both pull and push succeeded
//! - At most one cycle runs at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod error;
mod gateway;
mod http;
mod state;
mod summary;
mod trigger;

pub use applier::{ReplicaApplier, SyncApplier};
pub use config::{RetryConfig, SyncConfig, DEFAULT_PULL_PATH, DEFAULT_PUSH_PATH};
pub use error::{SyncError, SyncResult};
pub use gateway::{MockGateway, RemoteGateway};
pub use http::{HttpClient, HttpGateway, HttpResponse, LoopbackClient, LoopbackServer};
pub use state::{SyncEngine, SyncState, SyncStats};
pub use summary::{PartialSync, SyncSummary};
pub use trigger::{run_on_connectivity, run_triggers, ConnectivityTrigger};
