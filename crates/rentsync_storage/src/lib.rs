//! # rentsync storage
//!
//! Lowest layer of the rentsync replica: append-only byte stores and the
//! CRC-framed log format written on top of them.
//!
//! Backends are **opaque byte stores**. They never interpret what they hold;
//! the [`FramedLog`] adds record boundaries, a kind byte and a checksum so
//! that the record log and the change log in `rentsync_core` can be replayed
//! after a crash, ignoring a torn tail.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway replicas
//! - [`FileBackend`] - persistent replicas on the local file system
//!
//! ## Example
//!
//! ```rust
//! use rentsync_storage::{FramedLog, InMemoryBackend};
//!
//! let log = FramedLog::new(Box::new(InMemoryBackend::new()), *b"DEMO");
//! log.append(1, b"car1").unwrap();
//! let frames = log.replay().unwrap().frames;
//! assert_eq!(frames[0].payload, b"car1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{compute_crc32, Frame, FramedLog, Replay, FRAME_OVERHEAD};
pub use memory::InMemoryBackend;
