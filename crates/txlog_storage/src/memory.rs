//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory segment.
///
/// Handles created with [`InMemoryBackend::share`] see the same bytes, which
/// lets a log writer and its readers work on one segment the way separate
/// file handles would.
///
/// # Example
///
/// ```rust
/// use txlog_storage::{StorageBackend, InMemoryBackend};
///
/// let mut writer = InMemoryBackend::new();
/// let reader = writer.share_read_only();
/// writer.append(b"entry").unwrap();
/// assert_eq!(reader.size().unwrap(), 5);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    read_only: bool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for feeding recovery hand-crafted or damaged bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            read_only: false,
        }
    }

    /// Returns a writable handle sharing this backend's bytes.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: false,
        }
    }

    /// Returns a read-only handle sharing this backend's bytes.
    #[must_use]
    pub fn share_read_only(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: true,
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites a single byte in place.
    ///
    /// Only meant for tests that simulate media corruption.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is past the end of the data.
    pub fn corrupt_byte(&self, offset: u64, f: impl FnOnce(u8) -> u8) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        let byte = usize::try_from(offset)
            .ok()
            .and_then(|index| data.get_mut(index))
            .ok_or(StorageError::ReadPastEnd { offset, len: 1, size })?;
        *byte = f(*byte);
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let offset_usize = offset as usize;
        let end = offset_usize.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset_usize..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size: current_size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_correct_offset() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_extending_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(10, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn shared_handles_see_same_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.share_read_only();
        let mut second_writer = writer.share();

        writer.append(b"abc").unwrap();
        second_writer.append(b"def").unwrap();

        assert_eq!(reader.read_at(0, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let writer = InMemoryBackend::new();
        let mut reader = writer.share_read_only();
        assert!(matches!(reader.append(b"x"), Err(StorageError::ReadOnly)));
    }

    #[test]
    fn memory_truncate_partial() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(backend.truncate(100).is_err());
    }

    #[test]
    fn corrupt_byte_flips_in_place() {
        let backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        backend.corrupt_byte(1, |b| b ^ 0xFF).unwrap();
        assert_eq!(backend.data(), vec![1, 0xFD, 3]);
        assert!(backend.corrupt_byte(3, |b| b).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn appends_read_back_at_returned_offsets(
                chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16)
            ) {
                let mut backend = InMemoryBackend::new();
                let mut offsets = Vec::new();
                for chunk in &chunks {
                    offsets.push(backend.append(chunk).unwrap());
                }
                for (chunk, offset) in chunks.iter().zip(offsets) {
                    prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
                }
            }
        }
    }
}
