//! Error types for the transaction log.

use crate::position::LogPosition;
use crate::store_id::StoreId;
use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in transaction log operations.
///
/// Reaching the end of the log is not an error: readers report it as
/// `Ok(None)` or by ending iteration.
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txlog_storage::StorageError),

    /// Channel error.
    #[error("codec error: {0}")]
    Codec(#[from] txlog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry header declares a field count its layout does not have.
    #[error("Illegal struct size: Expected struct to be {expected} fields but got {actual}")]
    IllegalStructSize {
        /// Field count required by the layout.
        expected: u8,
        /// Field count declared by the header.
        actual: u8,
    },

    /// No layout is registered for a kernel version and entry type.
    #[error("unsupported log entry: kernel version {kernel_version}, entry type {entry_type}")]
    UnsupportedEntryVersion {
        /// Kernel version byte of the entry.
        kernel_version: u8,
        /// Entry type code of the entry.
        entry_type: u8,
    },

    /// The log is damaged at a position other than its tail.
    #[error("log corruption at {position}: {message}")]
    LogCorruption {
        /// Position of the first damaged entry.
        position: LogPosition,
        /// Description of the damage.
        message: String,
    },

    /// A checkpoint was written by a different store.
    #[error("{found} has different origin than this store, {expected}")]
    IncompatibleStoreId {
        /// Identity of the running store.
        expected: Box<StoreId>,
        /// Identity found in the log.
        found: Box<StoreId>,
    },

    /// An argument is outside its valid range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl LogError {
    /// Creates a log corruption error.
    pub fn log_corruption(position: LogPosition, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            position,
            message: message.into(),
        }
    }

    /// Creates a log corruption error whose position is filled in by the
    /// reader that observes it.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::log_corruption(LogPosition::UNSPECIFIED, message)
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an unsupported entry version error.
    pub fn unsupported(kernel_version: u8, entry_type: u8) -> Self {
        Self::UnsupportedEntryVersion {
            kernel_version,
            entry_type,
        }
    }

    /// Attaches `position` to a corruption error that has none yet.
    #[must_use]
    pub fn at_position(self, position: LogPosition) -> Self {
        match self {
            Self::LogCorruption {
                position: existing,
                message,
            } if !existing.is_specified() => Self::LogCorruption { position, message },
            other => other,
        }
    }

    /// Returns true if the error means the channel ran out of bytes.
    #[must_use]
    pub fn is_end_of_channel(&self) -> bool {
        matches!(self, Self::Codec(e) if e.is_eof())
    }
}
