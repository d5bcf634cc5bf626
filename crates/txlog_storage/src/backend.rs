//! Storage backend trait definition.

use crate::error::StorageResult;

/// A byte store holding one segment of the transaction log.
///
/// Backends are **opaque byte stores**. The log owns every format decision;
/// a backend only guarantees that bytes read back are the bytes appended.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` hands appended data to the operating system
/// - `sync` makes appended data durable
/// - Backends must be `Send + Sync` so readers and the writer can live on
///   different threads
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent segment files
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends past the current size or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the segment.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is read-only or an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands all appended data to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the segment in bytes.
    ///
    /// This is the offset where the next `append` will write. Read-only
    /// handles report the size as currently visible on the medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Forces data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the segment to `new_size` bytes.
    ///
    /// Used by recovery to cut off an incomplete entry at the tail of the
    /// last segment.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size, the
    /// backend is read-only, or the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
