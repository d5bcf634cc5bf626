//! Versioned body layouts.
//!
//! Each `(kernel version, entry type)` pair maps to exactly one layout. A
//! new kernel version either reuses an existing layout verbatim or adds a
//! new variant here; readers of old logs keep using the old layout.
//!
//! | Entry              | V4_2       | V4_3_D4                | V4_4                   | V5_0                   |
//! |--------------------|------------|------------------------|------------------------|------------------------|
//! | Start              | StartV4_2  | StartV4_2              | StartV4_2              | StartV5_0              |
//! | Command            | Command    | Command                | Command                | Command                |
//! | Commit             | CommitV4_2 | CommitV4_2             | CommitV4_2             | CommitV4_2             |
//! | DetachedCheckpoint | -          | DetachedCheckpointV4_2 | DetachedCheckpointV4_2 | DetachedCheckpointV4_2 |
//!
//! Framed layouts start their body with a one-byte field count. The
//! checkpoint layout predates framing; its field count is implied.

use super::checkpoint::DetachedCheckpointRecord;
use super::header::LogEntryHeader;
use super::{
    EntryType, LogEntry, LogEntryCommand, LogEntryCommit, LogEntryStart,
    MAX_ADDITIONAL_HEADER_SIZE, NO_CONSENSUS_INDEX,
};
use crate::command::CommandReaderFactory;
use crate::error::{LogError, LogResult};
use crate::kernel_version::KernelVersion;
use txlog_codec::{ReadableChannel, WritableChannel};

/// A body layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryLayout {
    /// Start entry without consensus index.
    StartV4_2,
    /// Start entry with consensus index.
    StartV5_0,
    /// Command entry; the body belongs to the command reader factory.
    Command,
    /// Commit entry.
    CommitV4_2,
    /// Fixed-size checkpoint body.
    DetachedCheckpointV4_2,
}

/// A parsed body whose checksum has not been validated yet.
#[derive(Debug)]
pub enum ParsedBody {
    /// A complete entry.
    Entry(LogEntry),
    /// A checkpoint body, converted into an entry only once trusted.
    Checkpoint(DetachedCheckpointRecord),
}

impl ParsedBody {
    /// Converts the body into an entry.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if a checkpoint body is inconsistent.
    pub fn into_entry(self, kernel_version: KernelVersion) -> LogResult<LogEntry> {
        match self {
            Self::Entry(entry) => Ok(entry),
            Self::Checkpoint(record) => record.into_entry(kernel_version).map(LogEntry::from),
        }
    }
}

impl EntryLayout {
    /// Returns the layout registered for a pair, if any.
    #[must_use]
    pub fn select(kernel_version: KernelVersion, entry_type: EntryType) -> Option<Self> {
        use KernelVersion::{V4_2, V4_3_D4, V4_4, V5_0};

        match (entry_type, kernel_version) {
            (EntryType::TxStart, V4_2 | V4_3_D4 | V4_4) => Some(Self::StartV4_2),
            (EntryType::TxStart, V5_0) => Some(Self::StartV5_0),
            (EntryType::Command, _) => Some(Self::Command),
            (EntryType::TxCommit, _) => Some(Self::CommitV4_2),
            (EntryType::DetachedCheckpoint, V4_2) => None,
            (EntryType::DetachedCheckpoint, V4_3_D4 | V4_4 | V5_0) => {
                Some(Self::DetachedCheckpointV4_2)
            }
        }
    }

    /// Returns the layout registered for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::UnsupportedEntryVersion`] if there is none.
    pub fn lookup(kernel_version: KernelVersion, entry_type: EntryType) -> LogResult<Self> {
        Self::select(kernel_version, entry_type)
            .ok_or_else(|| LogError::unsupported(kernel_version.version(), entry_type.code()))
    }

    /// Returns the number of fields the layout requires.
    #[must_use]
    pub const fn field_count(self) -> u8 {
        match self {
            Self::StartV4_2 => 4,
            Self::StartV5_0 => 5,
            Self::Command => 1,
            Self::CommitV4_2 => 2,
            Self::DetachedCheckpointV4_2 => DetachedCheckpointRecord::FIELD_COUNT,
        }
    }

    /// Returns true if the body begins with a field count byte.
    #[must_use]
    pub const fn is_framed(self) -> bool {
        !matches!(self, Self::DetachedCheckpointV4_2)
    }

    /// Returns the size of the header in bytes.
    #[must_use]
    pub const fn header_size(self) -> usize {
        if self.is_framed() {
            3
        } else {
            2
        }
    }

    /// Reads a body described by `header`.
    ///
    /// The header is checked against the layout before any body byte is
    /// read, so a rejected header leaves the channel untouched.
    ///
    /// # Errors
    ///
    /// - [`LogError::UnsupportedEntryVersion`] if `header` does not select
    ///   this layout
    /// - [`LogError::IllegalStructSize`] if the declared field count differs
    ///   from the layout's
    /// - an end-of-channel error if the body is incomplete
    /// - a corruption error if a field is out of range
    pub fn parse(
        self,
        header: &LogEntryHeader,
        channel: &mut dyn ReadableChannel,
        commands: &dyn CommandReaderFactory,
    ) -> LogResult<ParsedBody> {
        if Self::select(header.kernel_version, header.entry_type) != Some(self) {
            return Err(LogError::unsupported(
                header.kernel_version.version(),
                header.entry_type.code(),
            ));
        }
        if header.field_count != self.field_count() {
            return Err(LogError::IllegalStructSize {
                expected: self.field_count(),
                actual: header.field_count,
            });
        }

        let version = header.kernel_version;
        let entry = match self {
            Self::StartV4_2 => {
                let time_written = channel.get_i64()?;
                let last_committed_tx = channel.get_i64()?;
                let previous_checksum = channel.get_i32()?;
                let additional_header = read_additional_header(channel)?;
                LogEntry::Start(LogEntryStart::new(
                    version,
                    time_written,
                    last_committed_tx,
                    NO_CONSENSUS_INDEX,
                    previous_checksum,
                    additional_header,
                ))
            }
            Self::StartV5_0 => {
                let time_written = channel.get_i64()?;
                let last_committed_tx = channel.get_i64()?;
                let consensus_index = channel.get_i64()?;
                let previous_checksum = channel.get_i32()?;
                let additional_header = read_additional_header(channel)?;
                LogEntry::Start(LogEntryStart::new(
                    version,
                    time_written,
                    last_committed_tx,
                    consensus_index,
                    previous_checksum,
                    additional_header,
                ))
            }
            Self::Command => {
                let command = commands.decode(version, channel)?;
                LogEntry::Command(LogEntryCommand::new(version, command))
            }
            Self::CommitV4_2 => {
                let tx_id = channel.get_i64()?;
                let time_written = channel.get_i64()?;
                LogEntry::Commit(LogEntryCommit::new(version, tx_id, time_written))
            }
            Self::DetachedCheckpointV4_2 => {
                return Ok(ParsedBody::Checkpoint(DetachedCheckpointRecord::read(
                    channel,
                )?));
            }
        };
        Ok(ParsedBody::Entry(entry))
    }

    /// Writes the body of `entry`, without header or checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not use this layout, a field does
    /// not fit the layout, or the channel fails.
    pub fn write(self, entry: &LogEntry, channel: &mut dyn WritableChannel) -> LogResult<()> {
        match (self, entry) {
            (Self::StartV4_2, LogEntry::Start(start)) => {
                channel.put_i64(start.time_written())?;
                channel.put_i64(start.last_committed_tx_when_started())?;
                channel.put_i32(start.previous_checksum())?;
                write_additional_header(start.additional_header(), channel)
            }
            (Self::StartV5_0, LogEntry::Start(start)) => {
                channel.put_i64(start.time_written())?;
                channel.put_i64(start.last_committed_tx_when_started())?;
                channel.put_i64(start.consensus_index())?;
                channel.put_i32(start.previous_checksum())?;
                write_additional_header(start.additional_header(), channel)
            }
            (Self::Command, LogEntry::Command(command)) => command.command().serialize(channel),
            (Self::CommitV4_2, LogEntry::Commit(commit)) => {
                channel.put_i64(commit.tx_id())?;
                channel.put_i64(commit.time_written())?;
                Ok(())
            }
            (Self::DetachedCheckpointV4_2, LogEntry::DetachedCheckpoint(checkpoint)) => {
                DetachedCheckpointRecord::from_entry(checkpoint).write(channel)
            }
            (layout, entry) => Err(LogError::invalid_argument(format!(
                "layout {layout:?} cannot write {:?} entries",
                entry.entry_type()
            ))),
        }
    }
}

fn read_additional_header(channel: &mut dyn ReadableChannel) -> LogResult<Vec<u8>> {
    let len = channel.get_i32()?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_ADDITIONAL_HEADER_SIZE)
        .ok_or_else(|| LogError::malformed(format!("illegal additional header length {len}")))?;
    let mut bytes = vec![0u8; len];
    channel.get(&mut bytes)?;
    Ok(bytes)
}

fn write_additional_header(bytes: &[u8], channel: &mut dyn WritableChannel) -> LogResult<()> {
    if bytes.len() > MAX_ADDITIONAL_HEADER_SIZE {
        return Err(LogError::invalid_argument(format!(
            "additional header too large: {} bytes exceeds maximum of {} bytes",
            bytes.len(),
            MAX_ADDITIONAL_HEADER_SIZE
        )));
    }
    // Bounded by MAX_ADDITIONAL_HEADER_SIZE above.
    channel.put_i32(bytes.len() as i32)?;
    channel.put(bytes)?;
    Ok(())
}
