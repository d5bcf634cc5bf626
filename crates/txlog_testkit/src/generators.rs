//! Property-based test generators using proptest.
//!
//! Provides strategies for generating log entries and positions that
//! respect the codec's limits.

use proptest::prelude::*;
use std::sync::Arc;
use txlog_core::entry::MAX_DESCRIPTION_LENGTH;
use txlog_core::{
    KernelVersion, LogEntry, LogEntryCommand, LogEntryCommit, LogEntryDetachedCheckpoint,
    LogEntryStart, LogPosition, RawCommand, StorageCommand, StoreId,
};

/// Strategy for any supported kernel version.
pub fn kernel_version_strategy() -> impl Strategy<Value = KernelVersion> {
    prop::sample::select(KernelVersion::ALL.to_vec())
}

/// Strategy for kernel versions that can encode checkpoints.
pub fn checkpoint_version_strategy() -> impl Strategy<Value = KernelVersion> {
    prop::sample::select(vec![
        KernelVersion::V4_3_D4,
        KernelVersion::V4_4,
        KernelVersion::V5_0,
    ])
}

/// Strategy for valid log positions.
pub fn log_position_strategy() -> impl Strategy<Value = LogPosition> {
    (0i64..1_000, 0i64..(1 << 30)).prop_map(|(version, offset)| LogPosition::new(version, offset))
}

/// Strategy for store identities as decoded from checkpoints.
pub fn store_id_strategy() -> impl Strategy<Value = StoreId> {
    (any::<i64>(), any::<i64>()).prop_map(|(creation, random)| StoreId::legacy(creation, random))
}

/// Strategy for checkpoint reasons, some longer than the encoded limit.
pub fn reason_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[a-zA-Z0-9 éß☃]{{0,{}}}", MAX_DESCRIPTION_LENGTH * 2))
        .expect("Invalid regex")
}

/// Strategy for command payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for start entries under `version`.
pub fn start_strategy(version: KernelVersion) -> impl Strategy<Value = LogEntryStart> {
    (
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        any::<i32>(),
        prop::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(move |(time, last_tx, consensus, checksum, header)| {
            LogEntryStart::new(version, time, last_tx, consensus, checksum, header)
        })
}

/// Strategy for commit entries under `version`.
pub fn commit_strategy(version: KernelVersion) -> impl Strategy<Value = LogEntryCommit> {
    (1i64..i64::MAX, any::<i64>())
        .prop_map(move |(tx_id, time)| LogEntryCommit::new(version, tx_id, time))
}

/// Strategy for checkpoint entries under `version`.
pub fn checkpoint_strategy(
    version: KernelVersion,
) -> impl Strategy<Value = LogEntryDetachedCheckpoint> {
    (
        log_position_strategy(),
        any::<i64>(),
        store_id_strategy(),
        reason_strategy(),
    )
        .prop_map(move |(position, millis, store_id, reason)| {
            LogEntryDetachedCheckpoint::new(version, position, millis, store_id, &reason)
        })
}

/// Strategy for any entry the given version can encode.
pub fn log_entry_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    let start = start_strategy(version).prop_map(LogEntry::from);
    let command = payload_strategy().prop_map(move |payload| {
        let command: Arc<dyn StorageCommand> = Arc::new(RawCommand::new(payload));
        LogEntry::from(LogEntryCommand::new(version, command))
    });
    let commit = commit_strategy(version).prop_map(LogEntry::from);
    if version == KernelVersion::V4_2 {
        prop_oneof![start, command, commit].boxed()
    } else {
        let checkpoint = checkpoint_strategy(version).prop_map(LogEntry::from);
        prop_oneof![start, command, commit, checkpoint].boxed()
    }
}

/// Strategy for a run of entries, each under its own kernel version.
pub fn mixed_entries_strategy(max_len: usize) -> impl Strategy<Value = Vec<LogEntry>> {
    prop::collection::vec(
        kernel_version_strategy().prop_flat_map(log_entry_strategy),
        1..max_len.max(2),
    )
}

/// Shape of a transaction to append: its kernel version and command
/// payloads.
#[derive(Debug, Clone)]
pub struct TransactionShape {
    /// Kernel version of every entry in the transaction.
    pub kernel_version: KernelVersion,
    /// Payloads of the transaction's commands.
    pub payloads: Vec<Vec<u8>>,
}

/// Strategy for transaction shapes.
pub fn transaction_shape_strategy() -> impl Strategy<Value = TransactionShape> {
    (
        kernel_version_strategy(),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..4),
    )
        .prop_map(|(kernel_version, payloads)| TransactionShape {
            kernel_version,
            payloads,
        })
}
