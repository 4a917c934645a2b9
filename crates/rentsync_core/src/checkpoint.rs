//! The checkpoint: last server version fully synchronized.

use crate::dir::sync_directory;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use rentsync_protocol::{from_cbor, to_cbor, Revision};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable single-value store for the sync checkpoint.
///
/// A checkpoint only moves forward. Writing a lower version than the stored
/// one fails with [`CoreError::CheckpointRegression`]; writing the same
/// version is a no-op.
pub trait CheckpointStore: Send + Sync {
    /// Returns the stored version, or 0 if none was ever written.
    fn read(&self) -> CoreResult<Revision>;

    /// Replaces the stored version.
    ///
    /// The new value is durable when this returns.
    fn write(&self, version: Revision) -> CoreResult<()>;
}

/// Checkpoint held in memory only.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    version: Mutex<Revision>,
}

impl MemoryCheckpointStore {
    /// Creates a store at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read(&self) -> CoreResult<Revision> {
        Ok(*self.version.lock())
    }

    fn write(&self, version: Revision) -> CoreResult<()> {
        let mut current = self.version.lock();
        check_forward(*current, version)?;
        *current = version;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    latest_version: Revision,
}

/// Checkpoint kept in a file, replaced atomically on every write.
///
/// Writes go to a temporary file that is synced, renamed over the
/// checkpoint file, and followed by a directory fsync.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    temp_path: PathBuf,
    current: Mutex<Revision>,
}

impl FileCheckpointStore {
    /// Opens the checkpoint at `path`, reading its current value.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let current = match fs::read(path) {
            Ok(bytes) if bytes.is_empty() => 0,
            Ok(bytes) => {
                let file: CheckpointFile = from_cbor(&bytes).map_err(|e| {
                    CoreError::invalid_format(format!(
                        "unreadable checkpoint {}: {e}",
                        path.display()
                    ))
                })?;
                file.latest_version
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");

        Ok(Self {
            path: path.to_path_buf(),
            temp_path: PathBuf::from(temp_name),
            current: Mutex::new(current),
        })
    }

    /// Returns the checkpoint file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> CoreResult<Revision> {
        Ok(*self.current.lock())
    }

    fn write(&self, version: Revision) -> CoreResult<()> {
        let mut current = self.current.lock();
        check_forward(*current, version)?;
        if *current == version {
            return Ok(());
        }

        let data = to_cbor(&CheckpointFile {
            latest_version: version,
        })?;
        let mut file = File::create(&self.temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }

        *current = version;
        Ok(())
    }
}

fn check_forward(current: Revision, attempted: Revision) -> CoreResult<()> {
    if attempted < current {
        return Err(CoreError::CheckpointRegression { current, attempted });
    }
    Ok(())
}
