//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The record log and the change log of a replica are each kept in one
/// backend. Writers only ever append; the single destructive operation is
/// [`truncate`](StorageBackend::truncate), used to cut a torn tail after a
/// crash or to drop a change log whose entries have all been acknowledged.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at, which equals the
///   size before the call
/// - `read_at` returns exactly the bytes previously appended at that range
/// - after `sync` returns, every appended byte survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the store down to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is greater than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole store.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            crate::StorageError::corrupted(0, format!("store of {size} bytes does not fit in memory"))
        })?;
        self.read_at(0, len)
    }
}
