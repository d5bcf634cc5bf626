//! # txlog core
//!
//! A write-ahead transaction log.
//!
//! This crate provides:
//! - A versioned entry codec readable across kernel versions
//! - Segment rotation and position tracking
//! - Recovery reading that tells a torn tail from corruption
//! - Checkpoint thresholds and log pruning
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use txlog_core::{
//!     KernelVersion, LogConfig, LogEntryCommit, LogPosition, RawCommandReaderFactory, StoreId,
//!     TransactionLog,
//! };
//! use txlog_storage::InMemorySegmentStore;
//!
//! let log = TransactionLog::open(
//!     LogConfig::new(),
//!     Arc::new(InMemorySegmentStore::new()),
//!     &StoreId::generate("record", "aligned", 1, 1),
//!     Arc::new(RawCommandReaderFactory),
//! )
//! .unwrap();
//!
//! log.append(&LogEntryCommit::new(KernelVersion::V5_0, 1, 0).into()).unwrap();
//! log.flush().unwrap();
//!
//! let entries: Vec<_> = log.cursor(LogPosition::START).unwrap().collect();
//! assert_eq!(entries.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod checkpoint;
mod clock;
mod command;
mod config;
pub mod entry;
mod error;
mod kernel_version;
pub mod log;
mod position;
pub mod pruning;
pub mod recovery;
mod store_id;

pub use checkpoint::{CheckPointThreshold, CheckPointer, CheckpointPolicy};
pub use clock::{Clock, FakeClock, SystemClock};
pub use command::{
    CommandReaderFactory, RawCommand, RawCommandReaderFactory, StorageCommand,
    MAX_RAW_COMMAND_SIZE,
};
pub use config::LogConfig;
pub use entry::{
    EntryType, LogEntry, LogEntryCommand, LogEntryCommit, LogEntryDetachedCheckpoint,
    LogEntryStart, LogEntryWriter, VersionAwareLogEntryReader,
};
pub use error::{LogError, LogResult};
pub use kernel_version::KernelVersion;
pub use log::TransactionLog;
pub use position::{LogPosition, TransactionPosition};
pub use pruning::{LogPruner, PruningStrategy, RetentionPolicy};
pub use recovery::{CheckpointInfo, LogEntryCursor, LogTailInformation};
pub use store_id::{StoreId, StoreIdProvider, LEGACY_NAME};
