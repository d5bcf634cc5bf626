//! Retention strategies.
//!
//! A strategy names the lowest segment version that must survive. It
//! knows nothing about checkpoints or readers; [`super::LogPruner`] bounds
//! whatever it returns.

use super::Segments;
use crate::clock::{duration_millis, Clock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Returned for an empty segment run.
pub const NO_INDEX: i64 = -1;

/// Decides which segments are worth keeping.
pub trait PruningStrategy: Send + Sync + fmt::Debug {
    /// Returns the lowest version to keep.
    ///
    /// Returns [`NO_INDEX`] if `segments` is empty and the lowest resident
    /// version if nothing should be pruned.
    fn index_to_keep(&self, segments: &Segments) -> i64;
}

fn lowest(segments: &Segments) -> i64 {
    segments.lowest().map_or(NO_INDEX, |s| s.version)
}

/// Keeps every segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl PruningStrategy for KeepAll {
    fn index_to_keep(&self, segments: &Segments) -> i64 {
        lowest(segments)
    }
}

/// Keeps the newest `count` segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentCountPruning {
    count: u64,
}

impl SegmentCountPruning {
    /// Keeps `count` segments. Zero is treated as one.
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self {
            count: count.max(1),
        }
    }
}

impl PruningStrategy for SegmentCountPruning {
    fn index_to_keep(&self, segments: &Segments) -> i64 {
        let len = segments.len() as u64;
        if len <= self.count {
            return lowest(segments);
        }
        // Bounded by len above.
        segments.as_slice()[(len - self.count) as usize].version
    }
}

/// Keeps the newest segments whose total size reaches `bytes`.
#[derive(Debug, Clone, Copy)]
pub struct SizeBasedPruning {
    bytes: u64,
}

impl SizeBasedPruning {
    /// Keeps at least `bytes` of log.
    #[must_use]
    pub fn new(bytes: u64) -> Self {
        Self { bytes }
    }
}

impl PruningStrategy for SizeBasedPruning {
    fn index_to_keep(&self, segments: &Segments) -> i64 {
        let mut total = 0u64;
        for segment in segments.iter().rev() {
            total = total.saturating_add(segment.size);
            if total >= self.bytes {
                return segment.version;
            }
        }
        lowest(segments)
    }
}

/// Keeps the segments holding the newest `count` committed transactions.
#[derive(Debug, Clone, Copy)]
pub struct TransactionCountPruning {
    count: u64,
}

impl TransactionCountPruning {
    /// Keeps at least `count` transactions.
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self { count }
    }
}

impl PruningStrategy for TransactionCountPruning {
    fn index_to_keep(&self, segments: &Segments) -> i64 {
        let Some(newest_tx) = segments.iter().filter_map(|s| s.last_tx_id).max() else {
            return lowest(segments);
        };
        let count = i64::try_from(self.count).unwrap_or(i64::MAX);
        let cutoff = newest_tx.saturating_sub(count);
        // A segment holds transactions up to its last_tx_id and after the
        // previous segment's, so the first one ending past the cutoff is
        // the oldest one still needed.
        segments
            .iter()
            .find(|s| s.last_tx_id.is_some_and(|tx| tx > cutoff))
            .map_or_else(|| lowest(segments), |s| s.version)
    }
}

/// Keeps segments modified within `max_age`, and always the newest one.
#[derive(Debug, Clone)]
pub struct AgeBasedPruning {
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl AgeBasedPruning {
    /// Keeps segments younger than `max_age` as seen by `clock`.
    #[must_use]
    pub fn new(max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { max_age, clock }
    }
}

impl PruningStrategy for AgeBasedPruning {
    fn index_to_keep(&self, segments: &Segments) -> i64 {
        let cutoff = self.clock.millis().saturating_sub(duration_millis(self.max_age));
        segments
            .iter()
            .find(|s| s.modified_millis >= cutoff)
            .or_else(|| segments.highest())
            .map_or(NO_INDEX, |s| s.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::pruning::segments::segments;

    fn sized(sizes: &[u64]) -> Segments {
        let specs: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| (i as i64 + 10, *size, None, 0))
            .collect();
        segments(&specs)
    }

    #[test]
    fn empty_run_has_no_index() {
        let empty = Segments::default();
        assert_eq!(KeepAll.index_to_keep(&empty), NO_INDEX);
        assert_eq!(SegmentCountPruning::new(1).index_to_keep(&empty), NO_INDEX);
        assert_eq!(SizeBasedPruning::new(1).index_to_keep(&empty), NO_INDEX);
        assert_eq!(TransactionCountPruning::new(1).index_to_keep(&empty), NO_INDEX);
        let clock = Arc::new(FakeClock::new(0));
        assert_eq!(
            AgeBasedPruning::new(Duration::from_secs(1), clock).index_to_keep(&empty),
            NO_INDEX
        );
    }

    #[test]
    fn keep_all_returns_lowest() {
        assert_eq!(KeepAll.index_to_keep(&sized(&[1, 2, 3])), 10);
    }

    #[test]
    fn segment_count() {
        let run = sized(&[1, 1, 1, 1]);
        assert_eq!(SegmentCountPruning::new(2).index_to_keep(&run), 12);
        assert_eq!(SegmentCountPruning::new(4).index_to_keep(&run), 10);
        assert_eq!(SegmentCountPruning::new(9).index_to_keep(&run), 10);
        assert_eq!(SegmentCountPruning::new(0).index_to_keep(&run), 13);
    }

    #[test]
    fn size_based() {
        let run = sized(&[100, 100, 100]);
        assert_eq!(SizeBasedPruning::new(150).index_to_keep(&run), 11);
        assert_eq!(SizeBasedPruning::new(100).index_to_keep(&run), 12);
        assert_eq!(SizeBasedPruning::new(1_000).index_to_keep(&run), 10);
    }

    #[test]
    fn transaction_count() {
        let run = segments(&[
            (0, 1, Some(10), 0),
            (1, 1, Some(20), 0),
            (2, 1, None, 0),
            (3, 1, Some(30), 0),
        ]);
        assert_eq!(TransactionCountPruning::new(5).index_to_keep(&run), 3);
        assert_eq!(TransactionCountPruning::new(10).index_to_keep(&run), 3);
        assert_eq!(TransactionCountPruning::new(11).index_to_keep(&run), 1);
        assert_eq!(TransactionCountPruning::new(100).index_to_keep(&run), 0);
    }

    #[test]
    fn age_based() {
        let clock = Arc::new(FakeClock::new(10_000));
        let run = segments(&[(0, 1, None, 1_000), (1, 1, None, 5_000), (2, 1, None, 9_000)]);
        let strategy = AgeBasedPruning::new(Duration::from_secs(6), clock.clone());
        assert_eq!(strategy.index_to_keep(&run), 1);

        clock.advance(Duration::from_secs(100));
        assert_eq!(strategy.index_to_keep(&run), 2);
    }
}
