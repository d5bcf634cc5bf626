//! Bridging between consecutive segments.

use std::fmt;
use std::sync::Arc;
use txlog_storage::{SegmentStore, StorageBackend, StorageResult};

/// Supplies the segment that follows the one a reader has exhausted.
pub trait LogVersionBridge: Send + Sync + fmt::Debug {
    /// Opens the segment after `current_version`.
    ///
    /// Returns `Ok(None)` when there is no successor; the reader then
    /// reports end of log.
    ///
    /// # Errors
    ///
    /// Returns an error if the successor exists but cannot be opened.
    fn next(&self, current_version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>>;
}

/// A bridge that never continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMoreChannels;

impl LogVersionBridge for NoMoreChannels {
    fn next(&self, _current_version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>> {
        Ok(None)
    }
}

/// A bridge that opens `current_version + 1` from a segment store.
#[derive(Clone)]
pub struct ReaderLogVersionBridge {
    store: Arc<dyn SegmentStore>,
}

impl ReaderLogVersionBridge {
    /// Creates a bridge over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ReaderLogVersionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderLogVersionBridge").finish_non_exhaustive()
    }
}

impl LogVersionBridge for ReaderLogVersionBridge {
    fn next(&self, current_version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>> {
        self.store.open_reader(current_version + 1)
    }
}
