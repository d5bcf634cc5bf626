//! Log pruning.
//!
//! Segments entirely before the last checkpoint target are no longer
//! needed for recovery. A [`PruningStrategy`] decides how many of them are
//! still worth keeping; the [`LogPruner`] makes sure the answer never
//! endangers recovery or an active reader, and
//! [`crate::TransactionLog::prune`] deletes the prefix below it.

mod pruner;
mod retention;
mod segments;
mod strategy;

pub use pruner::LogPruner;
pub use retention::RetentionPolicy;
pub use segments::{Segment, Segments};
pub use strategy::{
    AgeBasedPruning, KeepAll, PruningStrategy, SegmentCountPruning, SizeBasedPruning,
    TransactionCountPruning, NO_INDEX,
};
