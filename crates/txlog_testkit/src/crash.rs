//! Crash and corruption simulation for transaction logs.
//!
//! Provides a segment store whose writers can be made to fail part way
//! through a write, and helpers that damage segment bytes directly.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use txlog_testkit::crash::CrashableSegmentStore;
//!
//! let store = Arc::new(CrashableSegmentStore::new());
//! store.crash_after(10);
//! // Appends past 10 bytes now fail, leaving a torn write behind.
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use txlog_storage::{
    InMemoryBackend, InMemorySegmentStore, SegmentStore, StorageBackend, StorageError,
    StorageResult,
};

/// Shared crash switches of a [`CrashableSegmentStore`].
#[derive(Debug)]
struct CrashState {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashState {
    fn new() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

/// A storage backend wrapper that can simulate crashes.
struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let state = &self.state;
        if state.crashed.load(Ordering::SeqCst) {
            return Err(state.crash("write"));
        }
        let current = state.bytes_written.fetch_add(bytes.len(), Ordering::SeqCst);
        let crash_threshold = state.crash_after_bytes.load(Ordering::SeqCst);

        if current >= crash_threshold {
            return Err(state.crash("write"));
        }

        // Check if this write will cross the crash threshold
        if current + bytes.len() > crash_threshold {
            let partial_len = crash_threshold - current;
            if partial_len > 0 {
                let _ = self.inner.append(&bytes[..partial_len]);
            }
            return Err(state.crash("partial write"));
        }

        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(self.state.crash("truncate"));
        }
        self.inner.truncate(new_size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.state.crash("sync"));
        }
        self.inner.sync()
    }
}

/// In-memory segments whose writers can crash mid-write.
///
/// Segment bytes survive a crash, so a log reopened over
/// [`inner`](Self::inner) sees exactly what reached storage.
#[derive(Debug)]
pub struct CrashableSegmentStore {
    inner: Arc<InMemorySegmentStore>,
    state: Arc<CrashState>,
}

impl Default for CrashableSegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashableSegmentStore {
    /// Creates an empty store that does not crash until told to.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemorySegmentStore::new()),
            state: Arc::new(CrashState::new()),
        }
    }

    /// Crashes once `bytes` more bytes have been appended across all
    /// segments. A write crossing the limit is torn at it.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.state.bytes_written.load(Ordering::SeqCst);
        self.state
            .crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether a simulated crash happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Returns the segments as they are in storage.
    pub fn inner(&self) -> &Arc<InMemorySegmentStore> {
        &self.inner
    }
}

impl SegmentStore for CrashableSegmentStore {
    fn open_writer(&self, version: i64) -> StorageResult<Box<dyn StorageBackend>> {
        if self.has_crashed() {
            return Err(self.state.crash("segment creation"));
        }
        Ok(Box::new(CrashableBackend {
            inner: self.inner.open_writer(version)?,
            state: Arc::clone(&self.state),
        }))
    }

    fn open_reader(&self, version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>> {
        self.inner.open_reader(version)
    }

    fn versions(&self) -> StorageResult<Vec<i64>> {
        self.inner.versions()
    }

    fn remove(&self, version: i64) -> StorageResult<()> {
        self.inner.remove(version)
    }

    fn modified_millis(&self, version: i64) -> StorageResult<i64> {
        self.inner.modified_millis(version)
    }
}

/// Flips every bit of the byte at `offset` in segment `version`.
///
/// Panics if the segment or offset does not exist.
pub fn flip_byte(store: &InMemorySegmentStore, version: i64, offset: u64) {
    segment(store, version)
        .corrupt_byte(offset, |b| !b)
        .expect("Failed to corrupt segment");
}

/// Cuts segment `version` down to `len` bytes.
pub fn truncate_segment(store: &InMemorySegmentStore, version: i64, len: u64) {
    segment(store, version)
        .truncate(len)
        .expect("Failed to truncate segment");
}

/// Appends `len` zero bytes to segment `version`, as left behind by
/// preallocation.
pub fn append_zeros(store: &InMemorySegmentStore, version: i64, len: usize) {
    segment(store, version)
        .append(&vec![0; len])
        .expect("Failed to append zeros");
}

/// Appends arbitrary bytes to segment `version`.
pub fn append_garbage(store: &InMemorySegmentStore, version: i64, bytes: &[u8]) {
    segment(store, version)
        .append(bytes)
        .expect("Failed to append bytes");
}

fn segment(store: &InMemorySegmentStore, version: i64) -> InMemoryBackend {
    store
        .segment(version)
        .unwrap_or_else(|| panic!("segment {version} does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{commit_transactions, committed_tx_ids, test_store_id};
    use txlog_core::{LogConfig, LogPosition, RawCommandReaderFactory, TransactionLog};

    fn open(store: Arc<dyn SegmentStore>) -> TransactionLog {
        TransactionLog::open(
            LogConfig::new().sync_on_flush(false),
            store,
            &test_store_id(),
            Arc::new(RawCommandReaderFactory),
        )
        .unwrap()
    }

    #[test]
    fn test_crashable_store_normal_operation() {
        let store = Arc::new(CrashableSegmentStore::new());
        let log = open(store.clone());
        commit_transactions(&log, 1..=3);
        assert!(!store.has_crashed());
        assert_eq!(committed_tx_ids(&log, LogPosition::START), vec![1, 2, 3]);
    }

    #[test]
    fn test_torn_write_is_dropped_on_reopen() {
        let store = Arc::new(CrashableSegmentStore::new());
        let log = open(store.clone());
        commit_transactions(&log, 1..=2);
        let durable = log.flushed_position();

        store.crash_after(30);
        commit_transactions_checked(&log, 3..=4);
        assert!(store.has_crashed());
        drop(log);

        let inner = Arc::clone(store.inner());
        let size = inner.segment(0).unwrap().data().len() as i64;
        assert_eq!(size, durable.byte_offset() + 30);

        let log = open(inner.clone());
        assert!(log.tail_information().has_incomplete_tail);
        assert_eq!(inner.segment(0).unwrap().data().len() as i64, durable.byte_offset());
        assert_eq!(log.append_position(), durable);
        assert_eq!(committed_tx_ids(&log, LogPosition::START), vec![1, 2]);
    }

    fn commit_transactions_checked(log: &TransactionLog, tx_ids: std::ops::RangeInclusive<i64>) {
        for tx_id in tx_ids {
            crate::fixtures::append_transaction(log, log.kernel_version(), tx_id, b"payload");
        }
        assert!(log.flush().is_err());
    }

    #[test]
    fn test_failed_sync_is_reported() {
        let store = Arc::new(CrashableSegmentStore::new());
        let log = open(store.clone());
        store.set_fail_on_sync(true);
        assert!(log.force().is_err());
        assert!(store.has_crashed());
    }

    #[test]
    fn test_corruption_helpers() {
        let store = InMemorySegmentStore::new();
        store.insert(0, vec![1, 2, 3]);
        flip_byte(&store, 0, 1);
        append_zeros(&store, 0, 2);
        append_garbage(&store, 0, &[9]);
        assert_eq!(store.segment(0).unwrap().data(), vec![1u8, !2u8, 3, 0, 0, 9]);
        truncate_segment(&store, 0, 2);
        assert_eq!(store.segment(0).unwrap().data(), vec![1u8, !2u8]);
    }
}
