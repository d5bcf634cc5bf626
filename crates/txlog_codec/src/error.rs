//! Error types for the codec crate.

use thiserror::Error;
use txlog_storage::StorageError;

/// Result type for channel operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while reading or writing a channel.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The channel ran out of bytes before a read completed.
    ///
    /// At the tail of a log this is the normal outcome of an entry that
    /// was only partially written.
    #[error("unexpected end of channel: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Number of bytes the read required.
        needed: usize,
        /// Number of bytes that were available.
        available: usize,
    },

    /// The stored checksum does not match the bytes it covers.
    #[error("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum read from the channel.
        expected: u32,
        /// Checksum computed over the bytes read.
        actual: u32,
    },

    /// The channel was closed.
    #[error("channel is closed")]
    Closed,

    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CodecError {
    /// Creates an end-of-channel error.
    #[must_use]
    pub fn eof(needed: usize, available: usize) -> Self {
        Self::UnexpectedEof { needed, available }
    }

    /// Returns true if this error means the channel ran out of bytes.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
