//! Scanning the log to find its tail and last checkpoint.

use super::LogEntryCursor;
use crate::channel::{ReadAheadLogChannel, ReaderLogVersionBridge};
use crate::entry::{
    LogEntry, LogEntryDetachedCheckpoint, LogEntryWriter, VersionAwareLogEntryReader,
};
use crate::error::{LogError, LogResult};
use crate::position::{LogPosition, TransactionPosition};
use std::collections::BTreeMap;
use std::sync::Arc;
use txlog_codec::InMemoryClosableChannel;
use txlog_storage::SegmentStore;

/// A checkpoint found in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// The checkpoint entry.
    pub entry: LogEntryDetachedCheckpoint,
    /// Where the checkpoint entry starts.
    pub entry_position: LogPosition,
    /// Where the checkpoint entry ends.
    pub end_position: LogPosition,
}

impl CheckpointInfo {
    /// Returns the position recovery starts from.
    #[must_use]
    pub fn target(&self) -> LogPosition {
        self.entry.log_position()
    }
}

/// What a full scan learned about the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTailInformation {
    /// Lowest resident segment version.
    pub oldest_version: i64,
    /// Position after the last valid entry.
    pub end_position: LogPosition,
    /// The last checkpoint, if any.
    pub last_checkpoint: Option<CheckpointInfo>,
    /// Highest committed transaction id, if any transaction committed.
    pub last_committed_tx_id: Option<i64>,
    /// Checksum of the last commit entry, or zero if there is none.
    pub last_commit_checksum: u32,
    /// The last committed transaction with the position after its commit
    /// entry.
    pub last_closed_transaction: Option<TransactionPosition>,
    /// First transaction committed at or after the last checkpoint target,
    /// or after the start of the log if there is no checkpoint.
    pub first_tx_after_checkpoint: Option<i64>,
    /// True if any non-checkpoint entry follows the checkpoint target.
    pub entries_after_checkpoint: bool,
    /// True if bytes follow `end_position` in its segment.
    pub has_incomplete_tail: bool,
    /// Last committed transaction id per segment version.
    pub segment_last_tx: BTreeMap<i64, i64>,
}

impl LogTailInformation {
    /// Returns true if committed transactions must be replayed.
    #[must_use]
    pub fn recovery_required(&self) -> bool {
        self.first_tx_after_checkpoint.is_some()
    }

    /// Returns the position replay starts from.
    #[must_use]
    pub fn recovery_start_position(&self) -> LogPosition {
        self.last_checkpoint
            .as_ref()
            .map_or(LogPosition::new(self.oldest_version, 0), CheckpointInfo::target)
    }
}

/// Reads a whole log to find where it ends.
pub struct LogTailScanner {
    store: Arc<dyn SegmentStore>,
    reader: VersionAwareLogEntryReader,
    read_ahead_size: usize,
}

impl LogTailScanner {
    /// Creates a scanner over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn SegmentStore>,
        reader: VersionAwareLogEntryReader,
        read_ahead_size: usize,
    ) -> Self {
        Self {
            store,
            reader,
            read_ahead_size,
        }
    }

    fn cursor(&self, from: LogPosition) -> LogResult<LogEntryCursor> {
        let backend = self
            .store
            .open_reader(from.log_version())?
            .ok_or_else(|| missing_segment(from.log_version()))?;
        let channel = ReadAheadLogChannel::new(from, backend, self.read_ahead_size)
            .with_bridge(Box::new(ReaderLogVersionBridge::new(Arc::clone(&self.store))));
        Ok(LogEntryCursor::new(self.reader.clone(), channel))
    }

    /// Scans every resident segment.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error met before the end of the log,
    /// [`LogError::LogCorruption`] if reading stops in a segment followed
    /// by a non-empty one, or [`LogError::InvalidOperation`] if the store
    /// holds no segment.
    pub fn scan(&self) -> LogResult<LogTailInformation> {
        let versions = self.store.versions()?;
        let (Some(&oldest), Some(&newest)) = (versions.first(), versions.last()) else {
            return Err(LogError::invalid_operation("log has no segments"));
        };

        let mut cursor = self.cursor(LogPosition::new(oldest, 0))?;
        let mut last_checkpoint = None;
        let mut last_committed_tx_id = None;
        let mut last_commit = None;
        let mut last_closed_transaction = None;
        let mut segment_last_tx = BTreeMap::new();
        while let Some(item) = cursor.next() {
            let (position, entry) = item?;
            match entry {
                LogEntry::Commit(commit) => {
                    last_committed_tx_id = Some(commit.tx_id());
                    last_closed_transaction =
                        Some(TransactionPosition::new(commit.tx_id(), cursor.position()));
                    segment_last_tx.insert(position.log_version(), commit.tx_id());
                    last_commit = Some(commit);
                }
                LogEntry::DetachedCheckpoint(checkpoint) => {
                    last_checkpoint = Some(CheckpointInfo {
                        entry: checkpoint,
                        entry_position: position,
                        end_position: cursor.position(),
                    });
                }
                LogEntry::Start(_) | LogEntry::Command(_) => {}
            }
        }

        // A decoded entry encodes back to its bytes, checksum included.
        let last_commit_checksum = match last_commit {
            Some(commit) => LogEntryWriter::new()
                .write_entry(&mut InMemoryClosableChannel::new(), &commit.into())?,
            None => 0,
        };

        let reached = cursor.position();
        let end_position = if reached.log_version() == newest {
            reached
        } else {
            self.ensure_empty_after(reached, &versions)?;
            LogPosition::new(newest, 0)
        };
        let newest_size = self
            .store
            .open_reader(newest)?
            .ok_or_else(|| missing_segment(newest))?
            .size()?;
        let has_incomplete_tail = newest_size > end_position.byte_offset() as u64;

        let from = last_checkpoint
            .as_ref()
            .map_or(LogPosition::new(oldest, 0), CheckpointInfo::target);
        let (first_tx_after_checkpoint, entries_after_checkpoint) =
            self.scan_after(from, end_position)?;

        Ok(LogTailInformation {
            oldest_version: oldest,
            end_position,
            last_checkpoint,
            last_committed_tx_id,
            last_commit_checksum,
            last_closed_transaction,
            first_tx_after_checkpoint,
            entries_after_checkpoint,
            has_incomplete_tail,
            segment_last_tx,
        })
    }

    /// Fails if a segment after the one reading stopped in holds data.
    fn ensure_empty_after(&self, reached: LogPosition, versions: &[i64]) -> LogResult<()> {
        for &version in versions.iter().filter(|v| **v > reached.log_version()) {
            let size = self
                .store
                .open_reader(version)?
                .ok_or_else(|| missing_segment(version))?
                .size()?;
            if size > 0 {
                return Err(LogError::log_corruption(
                    reached,
                    format!("log ends before segment {version}, which holds {size} bytes"),
                ));
            }
        }
        Ok(())
    }

    /// Looks for the first commit and any non-checkpoint entry in
    /// `from..end`.
    fn scan_after(&self, from: LogPosition, end: LogPosition) -> LogResult<(Option<i64>, bool)> {
        if from >= end || self.store.open_reader(from.log_version())?.is_none() {
            return Ok((None, false));
        }
        let mut entries_after = false;
        for item in self.cursor(from)? {
            let (position, entry) = item?;
            if position >= end {
                break;
            }
            match entry {
                LogEntry::DetachedCheckpoint(_) => {}
                LogEntry::Commit(commit) => return Ok((Some(commit.tx_id()), true)),
                LogEntry::Start(_) | LogEntry::Command(_) => entries_after = true,
            }
        }
        Ok((None, entries_after))
    }
}

fn missing_segment(version: i64) -> LogError {
    LogError::invalid_operation(format!("log segment {version} does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RawCommandReaderFactory;
    use crate::entry::LogEntryCommit;
    use crate::kernel_version::KernelVersion;
    use crate::store_id::StoreId;
    use txlog_storage::InMemorySegmentStore;

    fn encode(entries: &[LogEntry]) -> Vec<u8> {
        let mut channel = InMemoryClosableChannel::new();
        for entry in entries {
            LogEntryWriter::new().write_entry(&mut channel, entry).unwrap();
        }
        channel.as_bytes().to_vec()
    }

    fn commit(tx_id: i64) -> LogEntry {
        LogEntryCommit::new(KernelVersion::V5_0, tx_id, 0).into()
    }

    fn checkpoint(target: LogPosition) -> LogEntry {
        LogEntryDetachedCheckpoint::new(
            KernelVersion::V5_0,
            target,
            0,
            StoreId::legacy(1, 2),
            "test",
        )
        .into()
    }

    fn scan(store: InMemorySegmentStore) -> LogTailInformation {
        LogTailScanner::new(
            Arc::new(store),
            VersionAwareLogEntryReader::new(Arc::new(RawCommandReaderFactory)),
            128,
        )
        .scan()
        .unwrap()
    }

    #[test]
    fn empty_log() {
        let store = InMemorySegmentStore::new();
        store.insert(0, Vec::new());
        let tail = scan(store);

        assert_eq!(tail.end_position, LogPosition::START);
        assert!(tail.last_checkpoint.is_none());
        assert!(!tail.recovery_required());
        assert!(!tail.has_incomplete_tail);
        assert_eq!(tail.recovery_start_position(), LogPosition::START);
    }

    #[test]
    fn commits_after_checkpoint_require_recovery() {
        let first = encode(&[commit(1)]);
        let target = LogPosition::new(0, first.len() as i64);
        let mut bytes = first;
        bytes.extend(encode(&[checkpoint(target), commit(2)]));
        let store = InMemorySegmentStore::new();
        let len = bytes.len() as i64;
        store.insert(0, bytes);

        let tail = scan(store);
        assert_eq!(tail.end_position, LogPosition::new(0, len));
        assert_eq!(tail.last_committed_tx_id, Some(2));
        assert_eq!(
            tail.last_closed_transaction,
            Some(TransactionPosition::new(2, LogPosition::new(0, len)))
        );
        assert_eq!(tail.first_tx_after_checkpoint, Some(2));
        assert!(tail.recovery_required());
        assert_eq!(tail.recovery_start_position(), target);
        let checkpoint = tail.last_checkpoint.unwrap();
        assert_eq!(checkpoint.entry_position, target);
        assert!(checkpoint.end_position > checkpoint.entry_position);
    }

    #[test]
    fn clean_checkpoint_needs_no_recovery() {
        let first = encode(&[commit(1)]);
        let target = LogPosition::new(0, first.len() as i64);
        let mut bytes = first;
        bytes.extend(encode(&[checkpoint(target)]));
        let store = InMemorySegmentStore::new();
        store.insert(0, bytes);

        let tail = scan(store);
        assert!(!tail.recovery_required());
        assert!(!tail.entries_after_checkpoint);
    }

    #[test]
    fn incomplete_tail_is_detected() {
        let mut bytes = encode(&[commit(1), commit(2)]);
        let complete = bytes.len() as i64;
        bytes.extend_from_slice(&[5, 5, 2, 0, 0]);
        let store = InMemorySegmentStore::new();
        store.insert(0, bytes);

        let tail = scan(store);
        assert!(tail.has_incomplete_tail);
        assert_eq!(tail.end_position, LogPosition::new(0, complete));
    }

    #[test]
    fn per_segment_last_transactions() {
        let store = InMemorySegmentStore::new();
        store.insert(4, encode(&[commit(1), commit(2)]));
        store.insert(5, encode(&[commit(3)]));
        store.insert(6, Vec::new());

        let tail = scan(store);
        assert_eq!(tail.oldest_version, 4);
        assert_eq!(tail.end_position, LogPosition::new(6, 0));
        assert_eq!(tail.segment_last_tx.get(&4), Some(&2));
        assert_eq!(tail.segment_last_tx.get(&5), Some(&3));
        assert_eq!(tail.segment_last_tx.get(&6), None);
        assert_eq!(tail.recovery_start_position(), LogPosition::new(4, 0));
        assert_eq!(tail.first_tx_after_checkpoint, Some(1));
    }

    #[test]
    fn zero_padded_older_segment_before_data_is_corruption() {
        let store = InMemorySegmentStore::new();
        let mut first = encode(&[commit(1)]);
        let padded_at = first.len() as i64;
        first.extend_from_slice(&[0; 40]);
        store.insert(0, first);
        store.insert(1, encode(&[commit(2)]));

        let err = LogTailScanner::new(
            Arc::new(store),
            VersionAwareLogEntryReader::new(Arc::new(RawCommandReaderFactory)),
            128,
        )
        .scan()
        .unwrap_err();
        assert!(matches!(
            err,
            LogError::LogCorruption { position, .. } if position == LogPosition::new(0, padded_at)
        ));
    }

    #[test]
    fn empty_segments_after_the_end_are_clean() {
        let store = InMemorySegmentStore::new();
        let mut first = encode(&[commit(1)]);
        first.extend_from_slice(&[0; 40]);
        store.insert(0, first);
        store.insert(1, Vec::new());
        store.insert(2, Vec::new());

        let tail = scan(store);
        assert_eq!(tail.end_position, LogPosition::new(2, 0));
        assert!(!tail.has_incomplete_tail);
        assert_eq!(tail.last_committed_tx_id, Some(1));
    }
}
