//! Test fixtures and log helpers.
//!
//! Provides convenience functions for opening throwaway logs and driving
//! common scenarios against them.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use txlog_core::{
    KernelVersion, LogConfig, LogEntry, LogEntryCommit, LogEntryStart, LogPosition,
    RawCommand, RawCommandReaderFactory, StorageCommand, StoreId, TransactionLog,
    TransactionPosition,
};
use txlog_storage::{DirectorySegmentStore, InMemorySegmentStore, SegmentStore};

/// Returns the store identity used by test logs.
#[must_use]
pub fn test_store_id() -> StoreId {
    StoreId::new(1_700_000_000_000, 0x5eed, "record", "aligned", 1, 1)
}

enum Backing {
    Memory(Arc<InMemorySegmentStore>),
    Directory(TempDir),
}

/// A test log with automatic cleanup.
pub struct TestLog {
    /// The log instance.
    pub log: Arc<TransactionLog>,
    backing: Backing,
    config: LogConfig,
}

impl TestLog {
    /// Creates a log over in-memory segments with default settings.
    pub fn memory() -> Self {
        Self::memory_with(LogConfig::new().sync_on_flush(false))
    }

    /// Creates a log over in-memory segments.
    pub fn memory_with(config: LogConfig) -> Self {
        Self::open(Backing::Memory(Arc::new(InMemorySegmentStore::new())), config)
    }

    /// Creates a log over segment files in a temporary directory.
    pub fn directory() -> Self {
        Self::directory_with(LogConfig::new())
    }

    /// Creates a file-based log with the given settings.
    pub fn directory_with(config: LogConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::open(Backing::Directory(temp_dir), config)
    }

    fn open(backing: Backing, config: LogConfig) -> Self {
        let store: Arc<dyn SegmentStore> = match &backing {
            Backing::Memory(store) => Arc::clone(store) as Arc<dyn SegmentStore>,
            Backing::Directory(dir) => Arc::new(
                DirectorySegmentStore::open(dir.path()).expect("Failed to open log directory"),
            ),
        };
        let log = TransactionLog::open(
            config.clone(),
            store,
            &test_store_id(),
            Arc::new(RawCommandReaderFactory),
        )
        .expect("Failed to open log");
        Self {
            log: Arc::new(log),
            backing,
            config,
        }
    }

    /// Closes the log and opens it again over the same segments, as after
    /// a restart.
    ///
    /// Panics if another handle to the log is still alive and the log is
    /// file-based, since its directory lock is still held.
    pub fn reopen(self) -> Self {
        let Self {
            log,
            backing,
            config,
        } = self;
        drop(log);
        Self::open(backing, config)
    }

    /// Returns the in-memory segments, if the log is memory-based.
    pub fn memory_store(&self) -> Option<&Arc<InMemorySegmentStore>> {
        match &self.backing {
            Backing::Memory(store) => Some(store),
            Backing::Directory(_) => None,
        }
    }

    /// Returns the log directory, if the log is file-based.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Memory(_) => None,
            Backing::Directory(dir) => Some(dir.path()),
        }
    }

    /// Returns the configuration the log was opened with.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

impl std::ops::Deref for TestLog {
    type Target = TransactionLog;

    fn deref(&self) -> &Self::Target {
        &self.log
    }
}

/// Runs a test with a temporary in-memory log.
///
/// # Example
///
/// ```rust
/// use txlog_testkit::{commit_transactions, with_temp_log};
///
/// with_temp_log(|log| {
///     commit_transactions(log, 1..=3);
///     assert_eq!(log.last_committed_tx_id(), 3);
/// });
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&TransactionLog) -> R,
{
    let test_log = TestLog::memory();
    f(&test_log.log)
}

/// Runs a test with a temporary file-based log.
pub fn with_file_log<F, R>(f: F) -> R
where
    F: FnOnce(&TransactionLog, &Path) -> R,
{
    let test_log = TestLog::directory();
    let path = test_log.path().expect("File log should have a path");
    f(&test_log.log, path)
}

/// Appends a small transaction under `version` and returns its position.
pub fn append_transaction(
    log: &TransactionLog,
    version: KernelVersion,
    tx_id: i64,
    payload: &[u8],
) -> TransactionPosition {
    let command: Arc<dyn StorageCommand> = Arc::new(RawCommand::new(payload.to_vec()));
    log.append_transaction(
        LogEntryStart::new(version, tx_id, tx_id - 1, tx_id, 0, Vec::new()),
        &[command],
        LogEntryCommit::new(version, tx_id, tx_id),
    )
    .expect("Failed to append transaction")
}

/// Appends and flushes one transaction per id. Returns the last one.
pub fn commit_transactions(
    log: &TransactionLog,
    tx_ids: impl IntoIterator<Item = i64>,
) -> TransactionPosition {
    let mut last = log.last_closed_transaction();
    for tx_id in tx_ids {
        last = append_transaction(log, log.kernel_version(), tx_id, &tx_id.to_le_bytes());
    }
    log.flush().expect("Failed to flush log");
    last
}

/// Reads every flushed entry from `from`.
///
/// Panics if the log cannot be read to its end.
pub fn read_entries(log: &TransactionLog, from: LogPosition) -> Vec<(LogPosition, LogEntry)> {
    log.cursor(from)
        .expect("Failed to open cursor")
        .collect::<Result<_, _>>()
        .expect("Failed to read log")
}

/// Returns the ids of all committed transactions readable from `from`.
pub fn committed_tx_ids(log: &TransactionLog, from: LogPosition) -> Vec<i64> {
    read_entries(log, from)
        .into_iter()
        .filter_map(|(_, entry)| entry.committed_tx_id())
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a log holding `tx_count` committed transactions, rotating
    /// every `rotation_threshold` bytes.
    pub fn rotated_log(tx_count: i64, rotation_threshold: u64) -> TestLog {
        let test_log = TestLog::memory_with(
            LogConfig::new()
                .sync_on_flush(false)
                .rotation_threshold(rotation_threshold),
        );
        commit_transactions(&test_log, 1..=tx_count);
        test_log
    }
}
