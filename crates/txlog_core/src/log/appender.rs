//! The single writer of the log.

use crate::channel::{FlushedPosition, PhysicalFlushableLogChannel};
use crate::command::StorageCommand;
use crate::entry::{LogEntry, LogEntryCommand, LogEntryCommit, LogEntryStart, LogEntryWriter};
use crate::error::LogResult;
use crate::position::{LogPosition, TransactionPosition};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use txlog_codec::{InMemoryClosableChannel, WritableChannel};
use txlog_storage::SegmentStore;

/// Appends encoded entries to the newest segment.
///
/// Entries are encoded into a scratch buffer first so their size is known
/// before any byte reaches the segment. If a batch would take the segment
/// past the rotation threshold, the appender rotates first, so entries
/// never straddle segments. A batch larger than the threshold still goes
/// into a fresh segment of its own.
pub struct LogAppender {
    channel: PhysicalFlushableLogChannel,
    scratch: InMemoryClosableChannel,
    writer: LogEntryWriter,
    store: Arc<dyn SegmentStore>,
    flushed: FlushedPosition,
    rotation_threshold: u64,
    sync_on_flush: bool,
    last_committed_tx_id: i64,
    last_commit_checksum: u32,
    last_closed: TransactionPosition,
    segment_last_tx: BTreeMap<i64, i64>,
}

impl fmt::Debug for LogAppender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogAppender")
            .field("position", &self.channel.position())
            .field("last_committed_tx_id", &self.last_committed_tx_id)
            .finish_non_exhaustive()
    }
}

/// Where an appender resumes.
#[derive(Debug, Clone)]
pub(crate) struct AppenderState {
    pub last_committed_tx_id: i64,
    pub last_commit_checksum: u32,
    pub last_closed: TransactionPosition,
    pub segment_last_tx: BTreeMap<i64, i64>,
}

impl LogAppender {
    pub(crate) fn new(
        channel: PhysicalFlushableLogChannel,
        store: Arc<dyn SegmentStore>,
        flushed: FlushedPosition,
        rotation_threshold: u64,
        sync_on_flush: bool,
        state: AppenderState,
    ) -> Self {
        Self {
            channel,
            scratch: InMemoryClosableChannel::new(),
            writer: LogEntryWriter::new(),
            store,
            flushed,
            rotation_threshold,
            sync_on_flush,
            last_committed_tx_id: state.last_committed_tx_id,
            last_commit_checksum: state.last_commit_checksum,
            last_closed: state.last_closed,
            segment_last_tx: state.segment_last_tx,
        }
    }

    /// Returns the position the next entry is written at.
    #[must_use]
    pub fn position(&self) -> LogPosition {
        self.channel.position()
    }

    /// Returns the version of the segment being written.
    #[must_use]
    pub fn current_version(&self) -> i64 {
        self.channel.version()
    }

    /// Returns the id of the last committed transaction.
    #[must_use]
    pub fn last_committed_tx_id(&self) -> i64 {
        self.last_committed_tx_id
    }

    /// Returns the checksum of the last commit entry in the log, or zero
    /// if there is none.
    #[must_use]
    pub fn last_commit_checksum(&self) -> u32 {
        self.last_commit_checksum
    }

    /// Returns the last transaction appended whole.
    #[must_use]
    pub fn last_closed_transaction(&self) -> TransactionPosition {
        self.last_closed
    }

    /// Returns the last committed transaction id of each segment.
    #[must_use]
    pub fn segment_last_tx(&self) -> &BTreeMap<i64, i64> {
        &self.segment_last_tx
    }

    /// Appends one entry and returns where it starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or rotation fails.
    pub fn append(&mut self, entry: &LogEntry) -> LogResult<LogPosition> {
        self.scratch.clear();
        let checksum = self.writer.write_entry(&mut self.scratch, entry)?;
        let position = self.write_scratch()?;
        if let Some(tx_id) = entry.committed_tx_id() {
            self.record_commit(tx_id, checksum);
        }
        Ok(position)
    }

    /// Appends a whole transaction into one segment.
    ///
    /// Every command is written under the commit's kernel version, and the
    /// start entry carries the checksum of the previous commit. Returns the
    /// transaction id with the position just after its commit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be encoded or rotation fails.
    /// Nothing is written in that case.
    pub fn append_transaction(
        &mut self,
        start: LogEntryStart,
        commands: &[Arc<dyn StorageCommand>],
        commit: LogEntryCommit,
    ) -> LogResult<TransactionPosition> {
        let version = commit.kernel_version();
        // Stored as the signed field the start layout declares.
        let start = start.with_previous_checksum(self.last_commit_checksum as i32);
        self.scratch.clear();
        self.writer.write_entry(&mut self.scratch, &start.into())?;
        for command in commands {
            let entry = LogEntryCommand::new(version, Arc::clone(command));
            self.writer.write_entry(&mut self.scratch, &entry.into())?;
        }
        let checksum = self.writer.write_entry(&mut self.scratch, &commit.into())?;

        self.write_scratch()?;
        self.record_commit(commit.tx_id(), checksum);
        let closed = TransactionPosition::new(commit.tx_id(), self.channel.position());
        self.last_closed = closed;
        Ok(closed)
    }

    fn write_scratch(&mut self) -> LogResult<LogPosition> {
        let size = self.scratch.write_position() as u64;
        let current = self.channel.size();
        if current > 0 && current + size > self.rotation_threshold {
            self.rotate()?;
        }
        let position = self.channel.position();
        self.channel.put(self.scratch.as_bytes())?;
        Ok(position)
    }

    fn record_commit(&mut self, tx_id: i64, checksum: u32) {
        self.last_committed_tx_id = tx_id;
        self.last_commit_checksum = checksum;
        self.segment_last_tx.insert(self.channel.version(), tx_id);
    }

    /// Flushes buffered entries and publishes the new flushed position.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be written.
    pub fn flush(&mut self) -> LogResult<LogPosition> {
        let position = self.channel.flush()?;
        self.flushed.set(position);
        Ok(position)
    }

    /// Flushes and syncs buffered entries, then publishes the new flushed
    /// position.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be written or synced.
    pub fn force(&mut self) -> LogResult<LogPosition> {
        let position = self.channel.force()?;
        self.flushed.set(position);
        Ok(position)
    }

    /// Closes the current segment and continues in the next version.
    ///
    /// The old segment is flushed and synced first, so nothing is ever
    /// appended to it again. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns an error if the old segment cannot be synced or the new one
    /// cannot be created.
    pub fn rotate(&mut self) -> LogResult<i64> {
        let closed_at = self.channel.force()?;
        self.flushed.set(closed_at);

        let version = closed_at.log_version() + 1;
        let backend = self.store.open_writer(version)?;
        self.channel = PhysicalFlushableLogChannel::new(version, backend, self.sync_on_flush)?;
        self.flushed.set(LogPosition::new(version, 0));
        info!(
            from = closed_at.log_version(),
            to = version,
            size = closed_at.byte_offset(),
            "rotated transaction log"
        );
        Ok(version)
    }

    /// Forgets per-segment bookkeeping for pruned segments.
    pub(crate) fn forget_segments_below(&mut self, version: i64) {
        self.segment_last_tx = self.segment_last_tx.split_off(&version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RawCommand;
    use crate::kernel_version::KernelVersion;
    use txlog_storage::InMemorySegmentStore;

    fn appender(store: &Arc<InMemorySegmentStore>, threshold: u64) -> (LogAppender, FlushedPosition) {
        let backend = store.open_writer(0).unwrap();
        let channel = PhysicalFlushableLogChannel::new(0, backend, false).unwrap();
        let flushed = FlushedPosition::new(LogPosition::START);
        let state = AppenderState {
            last_committed_tx_id: 0,
            last_commit_checksum: 0,
            last_closed: TransactionPosition::new(0, LogPosition::START),
            segment_last_tx: BTreeMap::new(),
        };
        let appender = LogAppender::new(
            channel,
            Arc::clone(store) as Arc<dyn SegmentStore>,
            flushed.clone(),
            threshold,
            false,
            state,
        );
        (appender, flushed)
    }

    fn commit(tx_id: i64) -> LogEntry {
        LogEntryCommit::new(KernelVersion::V5_0, tx_id, 0).into()
    }

    #[test]
    fn append_then_flush_publishes_position() {
        let store = Arc::new(InMemorySegmentStore::new());
        let (mut appender, flushed) = appender(&store, 1024);

        let first = appender.append(&commit(1)).unwrap();
        let second = appender.append(&commit(2)).unwrap();
        assert_eq!(first, LogPosition::START);
        assert!(second > first);
        assert_eq!(flushed.get(), LogPosition::START);

        let end = appender.flush().unwrap();
        assert_eq!(flushed.get(), end);
        assert_eq!(store.segment(0).unwrap().data().len() as i64, end.byte_offset());
        assert_eq!(appender.last_committed_tx_id(), 2);
    }

    #[test]
    fn rotates_before_crossing_threshold() {
        let store = Arc::new(InMemorySegmentStore::new());
        // One commit entry is 23 bytes.
        let (mut appender, flushed) = appender(&store, 50);

        assert_eq!(appender.append(&commit(1)).unwrap(), LogPosition::new(0, 0));
        assert_eq!(appender.append(&commit(2)).unwrap(), LogPosition::new(0, 23));
        assert_eq!(appender.append(&commit(3)).unwrap(), LogPosition::new(1, 0));
        assert_eq!(store.segment(0).unwrap().data().len(), 46);
        assert_eq!(flushed.get(), LogPosition::new(1, 0));
        assert_eq!(appender.segment_last_tx().get(&0), Some(&2));
        assert_eq!(appender.segment_last_tx().get(&1), Some(&3));
    }

    #[test]
    fn oversized_entry_gets_its_own_segment() {
        let store = Arc::new(InMemorySegmentStore::new());
        let (mut appender, _) = appender(&store, 10);

        assert_eq!(appender.append(&commit(1)).unwrap(), LogPosition::new(0, 0));
        assert_eq!(appender.append(&commit(2)).unwrap(), LogPosition::new(1, 0));
    }

    #[test]
    fn transaction_stays_in_one_segment() {
        let store = Arc::new(InMemorySegmentStore::new());
        let (mut appender, _) = appender(&store, 100);
        appender.append(&commit(1)).unwrap();

        let version = KernelVersion::V5_0;
        let closed = appender
            .append_transaction(
                LogEntryStart::new(version, 0, 1, 0, 0, Vec::new()),
                &[Arc::new(RawCommand::new(vec![7; 20])) as Arc<dyn StorageCommand>],
                LogEntryCommit::new(version, 2, 0),
            )
            .unwrap();

        assert_eq!(closed.tx_id, 2);
        assert_eq!(closed.position.log_version(), 1);
        assert_eq!(closed.position, appender.position());
        assert_eq!(appender.last_closed_transaction(), closed);
        assert_ne!(appender.last_commit_checksum(), 0);
    }

    #[test]
    fn forget_segments_below() {
        let store = Arc::new(InMemorySegmentStore::new());
        let (mut appender, _) = appender(&store, 30);
        for tx_id in 1..=3 {
            appender.append(&commit(tx_id)).unwrap();
        }
        appender.forget_segments_below(2);
        assert_eq!(appender.segment_last_tx().keys().copied().collect::<Vec<_>>(), vec![2]);
    }
}
