//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a segment.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A write was attempted through a read-only handle.
    #[error("storage handle is read-only")]
    ReadOnly,

    /// Truncation to a size larger than the current one was requested.
    #[error("cannot truncate to size {requested} which is greater than current size {size}")]
    InvalidTruncate {
        /// The requested size.
        requested: u64,
        /// The current size.
        size: u64,
    },

    /// Another process holds the log directory lock.
    #[error("log directory locked: another process has exclusive access")]
    Locked,

    /// A failed append left bytes in the segment that could not be removed.
    #[error("partial write past offset {offset} could not be removed")]
    PartialWrite {
        /// Size of the segment before the failed append.
        offset: u64,
    },

    /// The requested segment does not exist.
    #[error("segment {version} does not exist")]
    SegmentNotFound {
        /// Version of the missing segment.
        version: i64,
    },
}
