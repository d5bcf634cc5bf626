//! The transaction log.
//!
//! A [`TransactionLog`] ties a segment store to one [`LogAppender`] and any
//! number of readers. Opening a log scans it to its end, drops a partially
//! written tail and resumes appending there.

mod appender;
mod readers;

pub use appender::LogAppender;
pub use readers::{ReaderRegistration, ReaderRegistry};

use crate::channel::{
    FlushedPosition, PhysicalFlushableLogChannel, ReadAheadLogChannel, ReaderLogVersionBridge,
};
use crate::command::{CommandReaderFactory, StorageCommand};
use crate::config::LogConfig;
use crate::entry::{
    LogEntry, LogEntryCommit, LogEntryDetachedCheckpoint, LogEntryStart,
    VersionAwareLogEntryReader,
};
use crate::error::{LogError, LogResult};
use crate::kernel_version::KernelVersion;
use crate::position::{LogPosition, TransactionPosition};
use crate::pruning::{LogPruner, Segment, Segments};
use crate::recovery::{CheckpointInfo, LogEntryCursor, LogTailInformation, LogTailScanner};
use crate::store_id::{StoreId, StoreIdProvider};
use appender::AppenderState;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use txlog_storage::SegmentStore;

/// A write-ahead transaction log over numbered segments.
///
/// One writer appends through an internal lock. Readers open independent
/// cursors that only see flushed bytes. Pruning never removes a segment a
/// reader is positioned in or that recovery from the last checkpoint
/// needs.
pub struct TransactionLog {
    config: LogConfig,
    store: Arc<dyn SegmentStore>,
    store_id: StoreId,
    reader: VersionAwareLogEntryReader,
    appender: Mutex<LogAppender>,
    flushed: FlushedPosition,
    readers: Arc<ReaderRegistry>,
    last_checkpoint: RwLock<Option<CheckpointInfo>>,
    tail: LogTailInformation,
    kernel_version: RwLock<KernelVersion>,
    maintenance: Mutex<()>,
}

impl fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLog")
            .field("store_id", &self.store_id)
            .field("flushed", &self.flushed.get())
            .field("kernel_version", &*self.kernel_version.read())
            .finish_non_exhaustive()
    }
}

impl TransactionLog {
    /// Opens a log, creating segment 0 if the store is empty.
    ///
    /// The whole log is scanned. A partially written entry at the tail is
    /// cut off, and the last checkpoint must belong to the store named by
    /// `store_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::LogCorruption`] if the log is damaged before its
    /// tail, [`LogError::IncompatibleStoreId`] if the last checkpoint was
    /// written by another store, or a storage error.
    pub fn open(
        config: LogConfig,
        store: Arc<dyn SegmentStore>,
        store_id: &dyn StoreIdProvider,
        commands: Arc<dyn CommandReaderFactory>,
    ) -> LogResult<Self> {
        let store_id = store_id.store_id();
        if store.versions()?.is_empty() {
            store.open_writer(0)?;
            debug!("created first log segment");
        }

        let reader = VersionAwareLogEntryReader::new(commands);
        let tail =
            LogTailScanner::new(Arc::clone(&store), reader.clone(), config.read_ahead_size).scan()?;
        if let Some(checkpoint) = &tail.last_checkpoint {
            store_id.assert_compatible(checkpoint.entry.store_id())?;
        }

        let end = tail.end_position;
        let mut backend = store.open_writer(end.log_version())?;
        if tail.has_incomplete_tail {
            let size = backend.size()?;
            warn!(
                version = end.log_version(),
                size,
                valid = end.byte_offset(),
                "truncating incomplete log tail"
            );
            backend.truncate(u64::try_from(end.byte_offset()).unwrap_or(0))?;
            backend.sync()?;
        }

        let channel =
            PhysicalFlushableLogChannel::new(end.log_version(), backend, config.sync_on_flush)?;
        let flushed = FlushedPosition::new(end);
        let state = AppenderState {
            last_committed_tx_id: tail.last_committed_tx_id.unwrap_or(0),
            last_commit_checksum: tail.last_commit_checksum,
            last_closed: tail
                .last_closed_transaction
                .unwrap_or_else(|| TransactionPosition::new(0, end)),
            segment_last_tx: tail.segment_last_tx.clone(),
        };
        let appender = LogAppender::new(
            channel,
            Arc::clone(&store),
            flushed.clone(),
            config.rotation_threshold,
            config.sync_on_flush,
            state,
        );

        info!(
            oldest = tail.oldest_version,
            end = %end,
            last_tx = tail.last_committed_tx_id.unwrap_or(0),
            recovery_required = tail.recovery_required(),
            "opened transaction log"
        );

        Ok(Self {
            kernel_version: RwLock::new(config.kernel_version),
            config,
            store,
            store_id,
            reader,
            appender: Mutex::new(appender),
            flushed,
            readers: Arc::new(ReaderRegistry::new()),
            last_checkpoint: RwLock::new(tail.last_checkpoint.clone()),
            tail,
            maintenance: Mutex::new(()),
        })
    }

    /// Returns the configuration the log was opened with.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Returns the identity of the store this log belongs to.
    #[must_use]
    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    /// Returns the kernel version new entries are written with.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        *self.kernel_version.read()
    }

    /// Moves the log to a newer kernel version.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if `version` is older than the
    /// current one.
    pub fn set_kernel_version(&self, version: KernelVersion) -> LogResult<()> {
        let mut current = self.kernel_version.write();
        if version < *current {
            return Err(LogError::invalid_argument(format!(
                "cannot downgrade kernel version from {current:?} to {version:?}"
            )));
        }
        if version != *current {
            info!(from = ?*current, to = ?version, "upgraded log kernel version");
        }
        *current = version;
        Ok(())
    }

    /// Returns the entry reader used by this log's cursors.
    #[must_use]
    pub fn reader(&self) -> &VersionAwareLogEntryReader {
        &self.reader
    }

    /// Returns what the scan at open time found.
    #[must_use]
    pub fn tail_information(&self) -> &LogTailInformation {
        &self.tail
    }

    /// Returns the registry of active readers.
    #[must_use]
    pub fn readers(&self) -> &Arc<ReaderRegistry> {
        &self.readers
    }

    /// Appends one entry and returns where it starts.
    ///
    /// The entry is buffered until the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if the entry is not written
    /// under the log's kernel version, or an error if it cannot be encoded
    /// or rotation fails.
    pub fn append(&self, entry: &LogEntry) -> LogResult<LogPosition> {
        self.ensure_current_version(entry.kernel_version())?;
        self.appender.lock().append(entry)
    }

    /// Appends a whole transaction into one segment.
    ///
    /// The start entry's previous checksum is replaced with the checksum
    /// of the last commit in the log.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if the start or commit entry
    /// is not written under the log's kernel version, or an error if an
    /// entry cannot be encoded or rotation fails.
    pub fn append_transaction(
        &self,
        start: LogEntryStart,
        commands: &[Arc<dyn StorageCommand>],
        commit: LogEntryCommit,
    ) -> LogResult<TransactionPosition> {
        self.ensure_current_version(start.kernel_version())?;
        self.ensure_current_version(commit.kernel_version())?;
        self.appender
            .lock()
            .append_transaction(start, commands, commit)
    }

    fn ensure_current_version(&self, version: KernelVersion) -> LogResult<()> {
        let current = self.kernel_version();
        if version != current {
            return Err(LogError::invalid_argument(format!(
                "entry written under {version:?} but the log writes {current:?}"
            )));
        }
        Ok(())
    }

    /// Makes appended entries visible to readers, syncing if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be written.
    pub fn flush(&self) -> LogResult<LogPosition> {
        self.appender.lock().flush()
    }

    /// Flushes and syncs appended entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be written or synced.
    pub fn force(&self) -> LogResult<LogPosition> {
        self.appender.lock().force()
    }

    /// Continues the log in a new segment. Returns its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the old segment cannot be synced or the new one
    /// cannot be created.
    pub fn rotate(&self) -> LogResult<i64> {
        self.appender.lock().rotate()
    }

    /// Returns the position the next entry is written at.
    #[must_use]
    pub fn append_position(&self) -> LogPosition {
        self.appender.lock().position()
    }

    /// Returns the position readers can read up to.
    #[must_use]
    pub fn flushed_position(&self) -> LogPosition {
        self.flushed.get()
    }

    /// Returns the version of the segment being written.
    #[must_use]
    pub fn current_version(&self) -> i64 {
        self.appender.lock().current_version()
    }

    /// Returns the id of the last committed transaction, or zero.
    #[must_use]
    pub fn last_committed_tx_id(&self) -> i64 {
        self.appender.lock().last_committed_tx_id()
    }

    /// Returns the last transaction appended whole.
    #[must_use]
    pub fn last_closed_transaction(&self) -> TransactionPosition {
        self.appender.lock().last_closed_transaction()
    }

    /// Returns the checksum of the last commit entry, or zero.
    #[must_use]
    pub fn last_commit_checksum(&self) -> u32 {
        self.appender.lock().last_commit_checksum()
    }

    /// Opens a cursor reading from `from` up to the flushed position.
    ///
    /// The cursor holds its segment against pruning until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if `from` is past the flushed
    /// position or its segment has been pruned.
    pub fn cursor(&self, from: LogPosition) -> LogResult<LogEntryCursor> {
        let flushed = self.flushed.get();
        if from > flushed || from.log_version() < 0 || from.byte_offset() < 0 {
            return Err(LogError::invalid_argument(format!(
                "cannot read from {from}, log is flushed up to {flushed}"
            )));
        }

        let registration = self.readers.register(from.log_version());
        let backend = self.store.open_reader(from.log_version())?.ok_or_else(|| {
            LogError::invalid_argument(format!(
                "log segment {} is no longer available",
                from.log_version()
            ))
        })?;
        let channel = ReadAheadLogChannel::new(from, backend, self.config.read_ahead_size)
            .with_bridge(Box::new(ReaderLogVersionBridge::new(Arc::clone(&self.store))))
            .bounded_by(self.flushed.clone())
            .with_registration(registration);
        Ok(LogEntryCursor::new(self.reader.clone(), channel))
    }

    /// Describes the resident segments.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn segments(&self) -> LogResult<Segments> {
        let segment_last_tx = self.appender.lock().segment_last_tx().clone();
        let mut segments = Vec::new();
        for version in self.store.versions()? {
            let Some(backend) = self.store.open_reader(version)? else {
                continue;
            };
            segments.push(Segment {
                version,
                size: backend.size()?,
                last_tx_id: segment_last_tx.get(&version).copied(),
                modified_millis: self.store.modified_millis(version)?,
            });
        }
        Segments::new(segments)
    }

    /// Returns the last checkpoint written or found at open time.
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<CheckpointInfo> {
        self.last_checkpoint.read().clone()
    }

    /// Returns the position recovery would start from.
    #[must_use]
    pub fn recovery_start_position(&self) -> LogPosition {
        self.last_checkpoint
            .read()
            .as_ref()
            .map_or_else(|| self.tail.recovery_start_position(), CheckpointInfo::target)
    }

    /// Appends a checkpoint, syncs it and records it as the last one.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::IncompatibleStoreId`] if the checkpoint names
    /// another store, [`LogError::InvalidArgument`] if it is not written
    /// under the log's kernel version or its target lies past the append
    /// position or before the previous checkpoint's target, or an error if
    /// it cannot be written.
    pub fn checkpoint(&self, entry: LogEntryDetachedCheckpoint) -> LogResult<CheckpointInfo> {
        self.store_id.assert_compatible(entry.store_id())?;
        self.ensure_current_version(entry.kernel_version())?;

        let mut appender = self.appender.lock();
        let target = entry.log_position();
        let append_position = appender.position();
        if target > append_position || target.log_version() < 0 || target.byte_offset() < 0 {
            return Err(LogError::invalid_argument(format!(
                "checkpoint target {target} is past the end of the log at {append_position}"
            )));
        }
        let previous = self.last_checkpoint.read().as_ref().map(CheckpointInfo::target);
        if let Some(previous) = previous.filter(|previous| target < *previous) {
            return Err(LogError::invalid_argument(format!(
                "checkpoint target {target} precedes the previous target {previous}"
            )));
        }
        let entry_position = appender.append(&entry.clone().into())?;
        let end_position = appender.force()?;
        drop(appender);

        let info = CheckpointInfo {
            entry,
            entry_position,
            end_position,
        };
        *self.last_checkpoint.write() = Some(info.clone());
        Ok(info)
    }

    /// Deletes segments the pruner no longer needs. Returns the removed
    /// versions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or a segment cannot
    /// be removed. Segments removed before the failure stay removed.
    pub fn prune(&self, pruner: &LogPruner) -> LogResult<Vec<i64>> {
        let _maintenance = self.maintenance.lock();
        let segments = self.segments()?;
        let checkpoint = self.last_checkpoint.read().as_ref().map(CheckpointInfo::target);

        let readers = self.readers.lock();
        let min_reader = readers.values().copied().min();
        let keep = pruner.index_to_keep(&segments, checkpoint, min_reader);
        let mut removed = Vec::new();
        for segment in &segments {
            if segment.version >= keep {
                break;
            }
            self.store.remove(segment.version)?;
            removed.push(segment.version);
        }
        drop(readers);

        if !removed.is_empty() {
            self.appender.lock().forget_segments_below(keep);
            info!(
                removed = removed.len(),
                lowest_kept = keep,
                "pruned transaction log"
            );
        }
        Ok(removed)
    }
}
