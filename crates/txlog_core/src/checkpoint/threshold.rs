//! Checkpoint threshold policies.

use crate::clock::{duration_millis, Clock};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll interval of the continuous threshold.
pub const CONTINUOUS_CHECK_FREQUENCY_MILLIS: u64 = 100;

/// Poll interval of the transaction count threshold.
pub const COUNT_CHECK_FREQUENCY_MILLIS: u64 = 10_000;

/// Decides whether a checkpoint is due.
///
/// A threshold is either below or above its limit. It is reached as long
/// as the condition holds, so asking twice with the same transaction id
/// gives the same answer; only [`checkpoint_happened`] resets it.
///
/// [`checkpoint_happened`]: CheckPointThreshold::checkpoint_happened
pub trait CheckPointThreshold: Send + Sync + fmt::Debug {
    /// Sets the starting watermark, typically the last committed
    /// transaction found at startup.
    fn initialize(&self, tx_id: i64);

    /// Returns true if a checkpoint should run now.
    fn threshold_reached(&self, tx_id: i64) -> bool;

    /// Records that a checkpoint covering `tx_id` completed.
    fn checkpoint_happened(&self, tx_id: i64);

    /// Returns how often, at most, a scheduler should poll. Always positive.
    fn check_frequency_millis(&self) -> u64;
}

/// Reached as soon as any transaction commits past the last checkpoint.
#[derive(Debug, Default)]
pub struct ContinuousCheckPointThreshold {
    watermark: AtomicI64,
}

impl ContinuousCheckPointThreshold {
    /// Creates a threshold with watermark zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckPointThreshold for ContinuousCheckPointThreshold {
    fn initialize(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
    }

    fn threshold_reached(&self, tx_id: i64) -> bool {
        tx_id > self.watermark.load(Ordering::Acquire)
    }

    fn checkpoint_happened(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
    }

    fn check_frequency_millis(&self) -> u64 {
        CONTINUOUS_CHECK_FREQUENCY_MILLIS
    }
}

/// Reached once `count` transactions committed since the last checkpoint.
#[derive(Debug)]
pub struct CountCommittedTransactionThreshold {
    count: i64,
    watermark: AtomicI64,
}

impl CountCommittedTransactionThreshold {
    /// Creates a threshold of `count` transactions. Zero is treated as one.
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self {
            count: i64::try_from(count.max(1)).unwrap_or(i64::MAX),
            watermark: AtomicI64::new(0),
        }
    }
}

impl CheckPointThreshold for CountCommittedTransactionThreshold {
    fn initialize(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
    }

    fn threshold_reached(&self, tx_id: i64) -> bool {
        tx_id.saturating_sub(self.watermark.load(Ordering::Acquire)) >= self.count
    }

    fn checkpoint_happened(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
    }

    fn check_frequency_millis(&self) -> u64 {
        COUNT_CHECK_FREQUENCY_MILLIS
    }
}

/// Reached once `interval` has passed since the last checkpoint, if
/// anything committed in between.
#[derive(Debug)]
pub struct TimeCheckPointThreshold {
    interval_millis: i64,
    clock: Arc<dyn Clock>,
    watermark: AtomicI64,
    last_checkpoint_millis: AtomicI64,
}

impl TimeCheckPointThreshold {
    /// Creates a threshold of `interval` measured by `clock`.
    #[must_use]
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.millis();
        Self {
            interval_millis: duration_millis(interval).max(1),
            clock,
            watermark: AtomicI64::new(0),
            last_checkpoint_millis: AtomicI64::new(now),
        }
    }
}

impl CheckPointThreshold for TimeCheckPointThreshold {
    fn initialize(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
        self.last_checkpoint_millis
            .store(self.clock.millis(), Ordering::Release);
    }

    fn threshold_reached(&self, tx_id: i64) -> bool {
        let elapsed = self
            .clock
            .millis()
            .saturating_sub(self.last_checkpoint_millis.load(Ordering::Acquire));
        tx_id > self.watermark.load(Ordering::Acquire) && elapsed >= self.interval_millis
    }

    fn checkpoint_happened(&self, tx_id: i64) {
        self.watermark.store(tx_id, Ordering::Release);
        self.last_checkpoint_millis
            .store(self.clock.millis(), Ordering::Release);
    }

    fn check_frequency_millis(&self) -> u64 {
        self.interval_millis.unsigned_abs()
    }
}

/// Reached when any member is.
#[derive(Debug)]
pub struct AnyOfThreshold {
    members: Vec<Box<dyn CheckPointThreshold>>,
}

impl AnyOfThreshold {
    /// Combines `members`.
    #[must_use]
    pub fn new(members: Vec<Box<dyn CheckPointThreshold>>) -> Self {
        Self { members }
    }
}

impl CheckPointThreshold for AnyOfThreshold {
    fn initialize(&self, tx_id: i64) {
        for member in &self.members {
            member.initialize(tx_id);
        }
    }

    fn threshold_reached(&self, tx_id: i64) -> bool {
        self.members.iter().any(|m| m.threshold_reached(tx_id))
    }

    fn checkpoint_happened(&self, tx_id: i64) {
        for member in &self.members {
            member.checkpoint_happened(tx_id);
        }
    }

    fn check_frequency_millis(&self) -> u64 {
        self.members
            .iter()
            .map(|m| m.check_frequency_millis())
            .min()
            .unwrap_or(CONTINUOUS_CHECK_FREQUENCY_MILLIS)
    }
}

/// When to checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// After every commit.
    Continuous,
    /// After this many commits.
    TransactionCount(u64),
    /// After this much time, if anything committed.
    Time(Duration),
    /// After `tx_count` commits or `interval`, whichever comes first.
    Periodic {
        /// Commit count limit.
        tx_count: u64,
        /// Time limit.
        interval: Duration,
    },
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::Periodic {
            tx_count: 100_000,
            interval: Duration::from_secs(15 * 60),
        }
    }
}

impl CheckpointPolicy {
    /// Builds the threshold for this policy.
    #[must_use]
    pub fn build(&self, clock: Arc<dyn Clock>) -> Box<dyn CheckPointThreshold> {
        match *self {
            Self::Continuous => Box::new(ContinuousCheckPointThreshold::new()),
            Self::TransactionCount(n) => Box::new(CountCommittedTransactionThreshold::new(n)),
            Self::Time(interval) => Box::new(TimeCheckPointThreshold::new(interval, clock)),
            Self::Periodic { tx_count, interval } => Box::new(AnyOfThreshold::new(vec![
                Box::new(CountCommittedTransactionThreshold::new(tx_count)),
                Box::new(TimeCheckPointThreshold::new(interval, clock)),
            ])),
        }
    }
}
