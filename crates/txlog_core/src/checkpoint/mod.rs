//! Checkpointing.
//!
//! A [`CheckPointThreshold`] decides when a checkpoint is due and the
//! [`CheckPointer`] writes it, then prunes segments that recovery no
//! longer needs.

mod checkpointer;
mod threshold;

pub use checkpointer::CheckPointer;
pub use threshold::{
    AnyOfThreshold, CheckPointThreshold, CheckpointPolicy, ContinuousCheckPointThreshold,
    CountCommittedTransactionThreshold, TimeCheckPointThreshold, CONTINUOUS_CHECK_FREQUENCY_MILLIS,
    COUNT_CHECK_FREQUENCY_MILLIS,
};
