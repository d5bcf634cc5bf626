//! Writing checkpoints.

use super::CheckPointThreshold;
use crate::clock::Clock;
use crate::entry::LogEntryDetachedCheckpoint;
use crate::error::LogResult;
use crate::log::TransactionLog;
use crate::position::TransactionPosition;
use crate::pruning::LogPruner;
use crate::recovery::CheckpointInfo;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Writes checkpoints into a log and prunes behind them.
///
/// A checkpoint records the position of the last closed transaction: all
/// work up to it is durable in the store, so recovery starts there.
/// Checkpointing and pruning share one lock; committers only contend with
/// a checkpoint while its entry is appended.
pub struct CheckPointer {
    log: Arc<TransactionLog>,
    threshold: Box<dyn CheckPointThreshold>,
    pruner: LogPruner,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl fmt::Debug for CheckPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckPointer")
            .field("threshold", &self.threshold)
            .field("pruner", &self.pruner)
            .finish_non_exhaustive()
    }
}

impl CheckPointer {
    /// Creates a checkpointer. The threshold starts from the log's last
    /// committed transaction.
    #[must_use]
    pub fn new(
        log: Arc<TransactionLog>,
        threshold: Box<dyn CheckPointThreshold>,
        pruner: LogPruner,
        clock: Arc<dyn Clock>,
    ) -> Self {
        threshold.initialize(log.last_committed_tx_id());
        Self {
            log,
            threshold,
            pruner,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Creates a checkpointer from the log's checkpoint policy and
    /// retention settings.
    #[must_use]
    pub fn from_config(log: Arc<TransactionLog>, clock: Arc<dyn Clock>) -> Self {
        let config = log.config();
        let threshold = config.checkpoint_policy.build(Arc::clone(&clock));
        let pruner = LogPruner::new(config.retention.build(Arc::clone(&clock)));
        Self::new(log, threshold, pruner, clock)
    }

    /// Returns how often a scheduler should call
    /// [`check_point_if_needed`](Self::check_point_if_needed).
    #[must_use]
    pub fn check_frequency(&self) -> Duration {
        Duration::from_millis(self.threshold.check_frequency_millis())
    }

    /// Returns the log being checkpointed.
    #[must_use]
    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    /// Writes a checkpoint if the threshold is reached.
    ///
    /// Returns the written checkpoint, or `None` if none was due.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written or pruning
    /// fails.
    pub fn check_point_if_needed(
        &self,
        last_closed: TransactionPosition,
        reason: &str,
    ) -> LogResult<Option<CheckpointInfo>> {
        let _guard = self.lock.lock();
        if !self.threshold.threshold_reached(last_closed.tx_id) {
            return Ok(None);
        }
        self.write_check_point(last_closed, reason).map(Some)
    }

    /// Writes a checkpoint regardless of the threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written or pruning
    /// fails.
    pub fn force_check_point(
        &self,
        last_closed: TransactionPosition,
        reason: &str,
    ) -> LogResult<CheckpointInfo> {
        let _guard = self.lock.lock();
        self.write_check_point(last_closed, reason)
    }

    fn write_check_point(
        &self,
        last_closed: TransactionPosition,
        reason: &str,
    ) -> LogResult<CheckpointInfo> {
        let entry = LogEntryDetachedCheckpoint::new(
            self.log.kernel_version(),
            last_closed.position,
            self.clock.millis(),
            self.log.store_id().clone(),
            reason,
        );
        let info = self.log.checkpoint(entry)?;
        self.threshold.checkpoint_happened(last_closed.tx_id);
        info!(
            tx_id = last_closed.tx_id,
            target = %info.target(),
            at = %info.entry_position,
            reason,
            "checkpoint written"
        );

        let pruned = self.log.prune(&self.pruner)?;
        if pruned.is_empty() {
            debug!("nothing to prune after checkpoint");
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{ContinuousCheckPointThreshold, CountCommittedTransactionThreshold};
    use crate::clock::FakeClock;
    use crate::command::RawCommandReaderFactory;
    use crate::config::LogConfig;
    use crate::entry::{LogEntry, LogEntryCommit};
    use crate::kernel_version::KernelVersion;
    use crate::pruning::SegmentCountPruning;
    use crate::store_id::StoreId;
    use txlog_storage::{InMemorySegmentStore, SegmentStore};

    fn open(store: &Arc<InMemorySegmentStore>, config: LogConfig) -> Arc<TransactionLog> {
        let log = TransactionLog::open(
            config,
            Arc::clone(store) as Arc<dyn SegmentStore>,
            &StoreId::new(1, 2, "record", "aligned", 1, 1),
            Arc::new(RawCommandReaderFactory),
        )
        .unwrap();
        Arc::new(log)
    }

    fn commit(log: &TransactionLog, tx_id: i64) -> TransactionPosition {
        let entry: LogEntry = LogEntryCommit::new(KernelVersion::V5_0, tx_id, 0).into();
        log.append(&entry).unwrap();
        log.flush().unwrap();
        TransactionPosition::new(tx_id, log.append_position())
    }

    #[test]
    fn checkpoints_only_when_reached() {
        let store = Arc::new(InMemorySegmentStore::new());
        let log = open(&store, LogConfig::new().sync_on_flush(false));
        let checkpointer = CheckPointer::new(
            Arc::clone(&log),
            Box::new(CountCommittedTransactionThreshold::new(3)),
            LogPruner::new(Box::new(SegmentCountPruning::new(1))),
            Arc::new(FakeClock::new(42)),
        );

        let closed = commit(&log, 1);
        assert!(checkpointer.check_point_if_needed(closed, "scheduled").unwrap().is_none());

        commit(&log, 2);
        let closed = commit(&log, 3);
        let info = checkpointer
            .check_point_if_needed(closed, "scheduled")
            .unwrap()
            .unwrap();
        assert_eq!(info.target(), closed.position);
        assert_eq!(info.entry.checkpoint_time_millis(), 42);
        assert_eq!(info.entry.reason(), "scheduled");
        assert!(log.store_id().is_compatible_with(info.entry.store_id()));
        assert_eq!(log.last_checkpoint(), Some(info));

        assert!(checkpointer.check_point_if_needed(closed, "scheduled").unwrap().is_none());
    }

    #[test]
    fn forced_checkpoint_prunes_behind_it() {
        let store = Arc::new(InMemorySegmentStore::new());
        let log = open(
            &store,
            LogConfig::new().sync_on_flush(false).rotation_threshold(30),
        );
        let checkpointer = CheckPointer::new(
            Arc::clone(&log),
            Box::new(ContinuousCheckPointThreshold::new()),
            LogPruner::new(Box::new(SegmentCountPruning::new(1))),
            Arc::new(FakeClock::new(0)),
        );

        let mut closed = TransactionPosition::new(0, log.append_position());
        for tx_id in 1..=4 {
            closed = commit(&log, tx_id);
        }
        assert_eq!(store.versions().unwrap(), vec![0, 1, 2, 3]);

        checkpointer.force_check_point(closed, "shutdown").unwrap();
        assert_eq!(store.versions().unwrap().first(), Some(&3));
        assert_eq!(log.recovery_start_position(), closed.position);
    }

    #[test]
    fn from_config_uses_policy() {
        let store = Arc::new(InMemorySegmentStore::new());
        let log = open(
            &store,
            LogConfig::new().checkpoint_policy(crate::checkpoint::CheckpointPolicy::Continuous),
        );
        let checkpointer = CheckPointer::from_config(log, Arc::new(FakeClock::new(0)));
        assert_eq!(checkpointer.check_frequency(), Duration::from_millis(100));
    }
}
