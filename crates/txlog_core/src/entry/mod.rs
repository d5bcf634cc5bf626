//! Log entries and their versioned codec.
//!
//! # Wire format
//!
//! ```text
//! ┌─────────────┬────────────┬──────────────────────┬──────────────┐
//! │ version (1) │ type (1)   │ body (layout)        │ checksum (4) │
//! └─────────────┴────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! The checksum is a CRC-32 over version, type and body of exactly one
//! entry. Multi-byte fields, checksum included, use the byte order of the
//! entry's kernel version. The body layout is selected by the exact
//! `(kernel version, entry type)` pair; see [`EntryLayout`].

mod checkpoint;
mod header;
mod layout;
mod reader;
mod writer;

pub use checkpoint::{
    DetachedCheckpointRecord, LogEntryDetachedCheckpoint, MAX_DESCRIPTION_LENGTH,
};
pub use header::LogEntryHeader;
pub use layout::{EntryLayout, ParsedBody};
pub use reader::VersionAwareLogEntryReader;
pub use writer::LogEntryWriter;

use crate::command::StorageCommand;
use crate::error::LogResult;
use crate::kernel_version::KernelVersion;
use std::sync::Arc;
use txlog_codec::{InMemoryClosableChannel, OrderedChannel};

/// Largest additional header a start entry may carry.
pub const MAX_ADDITIONAL_HEADER_SIZE: usize = 8 * 1024;

/// Consensus index of start entries written before 5.0.
pub const NO_CONSENSUS_INDEX: i64 = -1;

/// Type code of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Transaction start.
    TxStart = 1,
    /// Storage command.
    Command = 3,
    /// Transaction commit.
    TxCommit = 5,
    /// Checkpoint written into the transaction log.
    DetachedCheckpoint = 7,
}

impl EntryType {
    /// Converts a type code to an entry type.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::TxStart),
            3 => Some(Self::Command),
            5 => Some(Self::TxCommit),
            7 => Some(Self::DetachedCheckpoint),
            _ => None,
        }
    }

    /// Returns the type code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Start of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryStart {
    kernel_version: KernelVersion,
    time_written: i64,
    last_committed_tx_when_started: i64,
    consensus_index: i64,
    previous_checksum: i32,
    additional_header: Vec<u8>,
}

impl LogEntryStart {
    /// Creates a start entry.
    ///
    /// Versions before 5.0 have no consensus index; it is stored as
    /// [`NO_CONSENSUS_INDEX`] for them.
    #[must_use]
    pub fn new(
        kernel_version: KernelVersion,
        time_written: i64,
        last_committed_tx_when_started: i64,
        consensus_index: i64,
        previous_checksum: i32,
        additional_header: Vec<u8>,
    ) -> Self {
        let consensus_index = if kernel_version.is_at_least(KernelVersion::V5_0) {
            consensus_index
        } else {
            NO_CONSENSUS_INDEX
        };
        Self {
            kernel_version,
            time_written,
            last_committed_tx_when_started,
            consensus_index,
            previous_checksum,
            additional_header,
        }
    }

    /// Returns the kernel version the entry is written under.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Returns when the transaction started, in epoch millis.
    #[must_use]
    pub fn time_written(&self) -> i64 {
        self.time_written
    }

    /// Returns the last committed transaction id at start.
    #[must_use]
    pub fn last_committed_tx_when_started(&self) -> i64 {
        self.last_committed_tx_when_started
    }

    /// Returns the consensus index.
    #[must_use]
    pub fn consensus_index(&self) -> i64 {
        self.consensus_index
    }

    /// Returns the checksum of the previous transaction.
    #[must_use]
    pub fn previous_checksum(&self) -> i32 {
        self.previous_checksum
    }

    /// Returns the opaque additional header.
    #[must_use]
    pub fn additional_header(&self) -> &[u8] {
        &self.additional_header
    }

    /// Returns this entry chained to a previous transaction's checksum.
    #[must_use]
    pub fn with_previous_checksum(mut self, previous_checksum: i32) -> Self {
        self.previous_checksum = previous_checksum;
        self
    }
}

/// Commit of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryCommit {
    kernel_version: KernelVersion,
    tx_id: i64,
    time_written: i64,
}

impl LogEntryCommit {
    /// Creates a commit entry.
    #[must_use]
    pub fn new(kernel_version: KernelVersion, tx_id: i64, time_written: i64) -> Self {
        Self {
            kernel_version,
            tx_id,
            time_written,
        }
    }

    /// Returns the kernel version the entry is written under.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Returns the committed transaction id.
    #[must_use]
    pub fn tx_id(&self) -> i64 {
        self.tx_id
    }

    /// Returns the commit time in epoch millis.
    #[must_use]
    pub fn time_written(&self) -> i64 {
        self.time_written
    }
}

/// A storage command belonging to the transaction in progress.
#[derive(Debug, Clone)]
pub struct LogEntryCommand {
    kernel_version: KernelVersion,
    command: Arc<dyn StorageCommand>,
}

impl LogEntryCommand {
    /// Creates a command entry.
    #[must_use]
    pub fn new(kernel_version: KernelVersion, command: Arc<dyn StorageCommand>) -> Self {
        Self {
            kernel_version,
            command,
        }
    }

    /// Returns the kernel version the entry is written under.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Returns the command.
    #[must_use]
    pub fn command(&self) -> &Arc<dyn StorageCommand> {
        &self.command
    }

    fn serialized(&self) -> LogResult<Vec<u8>> {
        let mut channel = InMemoryClosableChannel::new();
        channel.set_byte_order(self.kernel_version.byte_order());
        self.command.serialize(&mut channel)?;
        Ok(channel.as_bytes().to_vec())
    }
}

/// Commands are equal when they serialize to the same bytes.
impl PartialEq for LogEntryCommand {
    fn eq(&self, other: &Self) -> bool {
        self.kernel_version == other.kernel_version
            && matches!(
                (self.serialized(), other.serialized()),
                (Ok(a), Ok(b)) if a == b
            )
    }
}

/// An entry of the transaction log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    /// Transaction start.
    Start(LogEntryStart),
    /// Storage command.
    Command(LogEntryCommand),
    /// Transaction commit.
    Commit(LogEntryCommit),
    /// Checkpoint.
    DetachedCheckpoint(LogEntryDetachedCheckpoint),
}

impl LogEntry {
    /// Returns the kernel version the entry is written under.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        match self {
            Self::Start(e) => e.kernel_version(),
            Self::Command(e) => e.kernel_version(),
            Self::Commit(e) => e.kernel_version(),
            Self::DetachedCheckpoint(e) => e.kernel_version(),
        }
    }

    /// Returns the entry type.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Start(_) => EntryType::TxStart,
            Self::Command(_) => EntryType::Command,
            Self::Commit(_) => EntryType::TxCommit,
            Self::DetachedCheckpoint(_) => EntryType::DetachedCheckpoint,
        }
    }

    /// Returns the layout the entry is written with.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::UnsupportedEntryVersion`] if the entry's kernel
    /// version has no layout for its type.
    pub fn layout(&self) -> LogResult<EntryLayout> {
        EntryLayout::lookup(self.kernel_version(), self.entry_type())
    }

    /// Returns the committed transaction id for commit entries.
    #[must_use]
    pub fn committed_tx_id(&self) -> Option<i64> {
        match self {
            Self::Commit(commit) => Some(commit.tx_id()),
            _ => None,
        }
    }
}

impl From<LogEntryStart> for LogEntry {
    fn from(entry: LogEntryStart) -> Self {
        Self::Start(entry)
    }
}

impl From<LogEntryCommand> for LogEntry {
    fn from(entry: LogEntryCommand) -> Self {
        Self::Command(entry)
    }
}

impl From<LogEntryCommit> for LogEntry {
    fn from(entry: LogEntryCommit) -> Self {
        Self::Commit(entry)
    }
}

impl From<LogEntryDetachedCheckpoint> for LogEntry {
    fn from(entry: LogEntryDetachedCheckpoint) -> Self {
        Self::DetachedCheckpoint(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RawCommand;

    #[test]
    fn entry_type_codes() {
        for t in [
            EntryType::TxStart,
            EntryType::Command,
            EntryType::TxCommit,
            EntryType::DetachedCheckpoint,
        ] {
            assert_eq!(EntryType::from_code(t.code()), Some(t));
        }
        assert_eq!(EntryType::from_code(0), None);
        assert_eq!(EntryType::from_code(2), None);
    }

    #[test]
    fn start_before_5_0_has_no_consensus_index() {
        let start = LogEntryStart::new(KernelVersion::V4_4, 1, 2, 99, 3, Vec::new());
        assert_eq!(start.consensus_index(), NO_CONSENSUS_INDEX);

        let start = LogEntryStart::new(KernelVersion::V5_0, 1, 2, 99, 3, Vec::new());
        assert_eq!(start.consensus_index(), 99);
    }

    #[test]
    fn command_entries_compare_by_bytes() {
        let a = LogEntryCommand::new(KernelVersion::V5_0, Arc::new(RawCommand::new(vec![1, 2])));
        let b = LogEntryCommand::new(KernelVersion::V5_0, Arc::new(RawCommand::new(vec![1, 2])));
        let c = LogEntryCommand::new(KernelVersion::V5_0, Arc::new(RawCommand::new(vec![3])));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn committed_tx_id_only_for_commits() {
        let commit = LogEntry::from(LogEntryCommit::new(KernelVersion::V5_0, 7, 0));
        assert_eq!(commit.committed_tx_id(), Some(7));
        assert_eq!(commit.entry_type(), EntryType::TxCommit);

        let start = LogEntry::from(LogEntryStart::new(KernelVersion::V5_0, 0, 0, 0, 0, Vec::new()));
        assert_eq!(start.committed_tx_id(), None);
    }
}
