//! Safety bounds around a pruning strategy.

use super::{PruningStrategy, Segments, NO_INDEX};
use crate::position::LogPosition;
use std::sync::atomic::{AtomicI64, Ordering};

/// Applies a strategy without ever endangering recovery or readers.
///
/// The version returned by [`index_to_keep`](Self::index_to_keep) is:
///
/// - never above the segment holding the last checkpoint target
/// - never above the lowest segment held by an active reader
/// - never below a version returned earlier
///
/// The last rule takes precedence: segments below an earlier answer are
/// already gone, so no reader can be positioned in them. Without a
/// checkpoint nothing is pruned.
#[derive(Debug)]
pub struct LogPruner {
    strategy: Box<dyn PruningStrategy>,
    previous: AtomicI64,
}

impl LogPruner {
    /// Creates a pruner around `strategy`.
    #[must_use]
    pub fn new(strategy: Box<dyn PruningStrategy>) -> Self {
        Self {
            strategy,
            previous: AtomicI64::new(NO_INDEX),
        }
    }

    /// Returns the lowest segment version that must be kept.
    ///
    /// Returns [`NO_INDEX`] if `segments` is empty.
    pub fn index_to_keep(
        &self,
        segments: &Segments,
        checkpoint: Option<LogPosition>,
        min_reader_version: Option<i64>,
    ) -> i64 {
        let Some(lowest) = segments.lowest().map(|s| s.version) else {
            return NO_INDEX;
        };
        let Some(checkpoint) = checkpoint else {
            return self.previous.load(Ordering::Acquire).max(lowest);
        };

        let mut keep = self.strategy.index_to_keep(segments);
        if keep == NO_INDEX {
            keep = lowest;
        }
        keep = keep.min(checkpoint.log_version());
        if let Some(reader) = min_reader_version {
            keep = keep.min(reader);
        }
        let keep = keep.max(lowest);
        self.previous.fetch_max(keep, Ordering::AcqRel).max(keep)
    }
}
