//! Positions in the logical log.

use std::fmt;

/// An exact byte in the logical, version-spanning log.
///
/// Positions order by log version first and byte offset second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    log_version: i64,
    byte_offset: i64,
}

impl LogPosition {
    /// The first byte of the first segment.
    pub const START: Self = Self::new(0, 0);

    /// A position that refers to nothing.
    pub const UNSPECIFIED: Self = Self::new(-1, -1);

    /// Creates a position.
    #[must_use]
    pub const fn new(log_version: i64, byte_offset: i64) -> Self {
        Self {
            log_version,
            byte_offset,
        }
    }

    /// Returns the segment version.
    #[must_use]
    pub const fn log_version(&self) -> i64 {
        self.log_version
    }

    /// Returns the offset within the segment.
    #[must_use]
    pub const fn byte_offset(&self) -> i64 {
        self.byte_offset
    }

    /// Returns true unless this is [`LogPosition::UNSPECIFIED`].
    #[must_use]
    pub fn is_specified(&self) -> bool {
        *self != Self::UNSPECIFIED
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogPosition{{version={}, offset={}}}",
            self.log_version, self.byte_offset
        )
    }
}

/// A committed transaction and the log position right after its commit entry.
///
/// Checkpoints target this position: everything before it is reflected in
/// the store once the checkpoint completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionPosition {
    /// Id of the committed transaction.
    pub tx_id: i64,
    /// Position after the transaction's commit entry.
    pub position: LogPosition,
}

impl TransactionPosition {
    /// Creates a transaction position.
    #[must_use]
    pub const fn new(tx_id: i64, position: LogPosition) -> Self {
        Self { tx_id, position }
    }
}
