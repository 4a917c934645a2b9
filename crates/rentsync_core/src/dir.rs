//! Replica directory management.
//!
//! ```text
//! <replica_path>/
//! ├─ LOCK            # Advisory lock for single-process access
//! ├─ records.log     # Local store record frames
//! ├─ changes.log     # Pending change entries and acks
//! └─ CHECKPOINT      # Last synchronized server version
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const RECORDS_FILE: &str = "records.log";
const CHANGES_FILE: &str = "changes.log";
const CHECKPOINT_FILE: &str = "CHECKPOINT";

/// A locked replica directory.
///
/// Writers hold the lock exclusively, readers share it. The lock is released
/// when the value is dropped.
#[derive(Debug)]
pub struct ReplicaDir {
    path: PathBuf,
    _lock_file: File,
}

impl ReplicaDir {
    /// Opens or creates a replica directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - the directory is missing and `create_if_missing` is false
    /// - another process holds the lock (`ReplicaLocked`)
    /// - I/O errors
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "replica directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::ReplicaLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Opens an existing replica directory with a shared lock.
    ///
    /// Nothing is created. Fails with `ReplicaLocked` while a writer holds
    /// the directory.
    pub fn open_shared(path: &Path) -> CoreResult<Self> {
        let lock_file = match File::open(path.join(LOCK_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::invalid_format(format!(
                    "not a replica directory: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if lock_file.try_lock_shared().is_err() {
            return Err(CoreError::ReplicaLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the record log.
    #[must_use]
    pub fn records_path(&self) -> PathBuf {
        self.path.join(RECORDS_FILE)
    }

    /// Returns the path of the change log.
    #[must_use]
    pub fn changes_path(&self) -> PathBuf {
        self.path.join(CHANGES_FILE)
    }

    /// Returns the path of the checkpoint file.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.path.join(CHECKPOINT_FILE)
    }
}

/// Fsyncs a directory so renames and file creations inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// NTFS journals metadata; directories cannot be fsynced on Windows.
#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}
