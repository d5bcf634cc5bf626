//! Benchmark utilities.

use rand::Rng;
use std::sync::Arc;
use txlog_core::{
    KernelVersion, LogConfig, LogEntry, LogEntryCommand, LogEntryCommit,
    LogEntryDetachedCheckpoint, LogEntryStart, LogPosition, RawCommand, RawCommandReaderFactory,
    StorageCommand, StoreId, TransactionLog,
};
use txlog_storage::SegmentStore;

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Store identity used by every benchmark log.
pub fn bench_store_id() -> StoreId {
    StoreId::new(1, 2, "record", "aligned", 1, 1)
}

/// Generate a command carrying `payload_size` random bytes.
pub fn random_command(payload_size: usize) -> Arc<dyn StorageCommand> {
    Arc::new(RawCommand::new(random_data(payload_size)))
}

/// Generate the entries of one transaction: a start, `commands` commands
/// and a commit.
pub fn transaction_entries(
    version: KernelVersion,
    tx_id: i64,
    commands: usize,
    payload_size: usize,
) -> Vec<LogEntry> {
    let mut entries = Vec::with_capacity(commands + 2);
    entries.push(LogEntryStart::new(version, 0, tx_id - 1, tx_id, 0, vec![7; 16]).into());
    for _ in 0..commands {
        entries.push(LogEntryCommand::new(version, random_command(payload_size)).into());
    }
    entries.push(LogEntryCommit::new(version, tx_id, 0).into());
    entries
}

/// Generate a checkpoint entry with a reason of `reason_len` characters.
pub fn checkpoint_entry(version: KernelVersion, reason_len: usize) -> LogEntry {
    LogEntryDetachedCheckpoint::new(
        version,
        LogPosition::new(3, 1_024),
        0,
        StoreId::legacy(1, 2),
        &"r".repeat(reason_len),
    )
    .into()
}

/// Open a log over `store` that never syncs.
pub fn open_log(store: Arc<dyn SegmentStore>, rotation_threshold: u64) -> TransactionLog {
    TransactionLog::open(
        LogConfig::new()
            .sync_on_flush(false)
            .rotation_threshold(rotation_threshold),
        store,
        &bench_store_id(),
        Arc::new(RawCommandReaderFactory),
    )
    .expect("Failed to open benchmark log")
}

/// Append `count` transactions of `commands` commands each and flush.
pub fn fill_log(log: &TransactionLog, count: i64, commands: usize, payload_size: usize) {
    let version = log.kernel_version();
    let payloads: Vec<_> = (0..commands).map(|_| random_command(payload_size)).collect();
    let first = log.last_committed_tx_id() + 1;
    for tx_id in first..first + count {
        log.append_transaction(
            LogEntryStart::new(version, 0, tx_id - 1, tx_id, 0, Vec::new()),
            &payloads,
            LogEntryCommit::new(version, tx_id, 0),
        )
        .expect("Failed to append transaction");
    }
    log.flush().expect("Failed to flush log");
}
