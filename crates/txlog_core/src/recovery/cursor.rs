//! Forward iteration over log entries.

use crate::channel::{PositionAwareChannel, ReadAheadLogChannel};
use crate::entry::{LogEntry, VersionAwareLogEntryReader};
use crate::error::{LogError, LogResult};
use crate::position::LogPosition;
use tracing::warn;
use txlog_codec::InMemoryClosableChannel;

/// A lazy, forward-only sequence of log entries.
///
/// Each item is the position an entry starts at together with the entry.
/// Iteration ends at the end of the readable log, which includes a
/// truncated entry or a zero-filled remainder at the tail. A truncated
/// entry whose bytes still contain a whole entry is damage, not a torn
/// write, and is reported as corruption. Anything else
/// that cannot be decoded is yielded as an error, after which the cursor
/// is finished; entries before it have already been yielded.
///
/// A cursor cannot rewind. To restart, open a new cursor at a position
/// returned by [`position`](Self::position) or yielded with an entry.
#[derive(Debug)]
pub struct LogEntryCursor {
    reader: VersionAwareLogEntryReader,
    channel: ReadAheadLogChannel,
    position: LogPosition,
    finished: bool,
}

impl LogEntryCursor {
    /// Creates a cursor reading entries from `channel`.
    #[must_use]
    pub fn new(reader: VersionAwareLogEntryReader, channel: ReadAheadLogChannel) -> Self {
        let position = channel.current_position();
        Self {
            reader,
            channel,
            position,
            finished: false,
        }
    }

    /// Returns the position just after the last yielded entry.
    #[must_use]
    pub fn position(&self) -> LogPosition {
        self.position
    }

    fn read_next(&mut self) -> LogResult<Option<(LogPosition, LogEntry)>> {
        self.channel.skip_exhausted_segments()?;
        let start = self.channel.current_position();

        if let Some(entry) = self.reader.read_log_entry(&mut self.channel)? {
            self.position = self.channel.current_position();
            return Ok(Some((start, entry)));
        }

        let stop = self.channel.current_position();
        if stop.log_version() != start.log_version() {
            return Err(LogError::log_corruption(
                start,
                "entry continues into the next log segment",
            ));
        }
        if !self.channel.remaining_is_zeroed()? {
            return Err(LogError::log_corruption(
                start,
                "zero version byte followed by non-zero bytes",
            ));
        }
        // The entry ran into the end of the segment. Its bytes are a torn
        // write only if no whole entry hides inside them.
        if stop.byte_offset() > start.byte_offset() + 1 {
            let offset = u64::try_from(start.byte_offset() + 1).unwrap_or(0);
            let torn = self.channel.read_segment_from(offset)?;
            if let Some(found) = self.first_entry_within(&torn) {
                return Err(LogError::log_corruption(
                    start,
                    format!(
                        "length runs past the segment end over an entry at offset {}",
                        offset + found as u64
                    ),
                ));
            }
        }
        Ok(None)
    }

    /// Returns the offset of the first whole entry decodable inside `bytes`.
    fn first_entry_within(&self, bytes: &[u8]) -> Option<usize> {
        let mut channel = InMemoryClosableChannel::from_bytes(bytes);
        (0..bytes.len()).filter(|i| bytes[*i] != 0).find(|i| {
            channel.set_read_position(*i).is_ok()
                && matches!(self.reader.read_log_entry(&mut channel), Ok(Some(_)))
        })
    }
}

impl Iterator for LogEntryCursor {
    type Item = LogResult<(LogPosition, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                warn!(position = %self.position, error = %e, "stopped reading log");
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{RawCommand, RawCommandReaderFactory};
    use crate::entry::{LogEntryCommand, LogEntryCommit, LogEntryWriter};
    use crate::kernel_version::KernelVersion;
    use std::sync::Arc;
    use txlog_codec::InMemoryClosableChannel;
    use txlog_storage::InMemoryBackend;

    fn commits(tx_ids: std::ops::Range<i64>) -> Vec<u8> {
        let mut channel = InMemoryClosableChannel::new();
        for tx_id in tx_ids {
            let entry = LogEntry::Commit(LogEntryCommit::new(KernelVersion::V5_0, tx_id, 0));
            LogEntryWriter::new().write_entry(&mut channel, &entry).unwrap();
        }
        channel.as_bytes().to_vec()
    }

    fn cursor(bytes: Vec<u8>) -> LogEntryCursor {
        let channel = ReadAheadLogChannel::new(
            LogPosition::START,
            Box::new(InMemoryBackend::with_data(bytes)),
            64,
        );
        LogEntryCursor::new(
            VersionAwareLogEntryReader::new(Arc::new(RawCommandReaderFactory)),
            channel,
        )
    }

    fn tx_ids(cursor: &mut LogEntryCursor) -> Vec<i64> {
        cursor
            .map(|item| item.unwrap().1.committed_tx_id().unwrap())
            .collect()
    }

    #[test]
    fn yields_all_entries_with_positions() {
        let bytes = commits(1..4);
        let entry_size = bytes.len() as i64 / 3;
        let mut cursor = cursor(bytes);

        let (position, _) = cursor.next().unwrap().unwrap();
        assert_eq!(position, LogPosition::START);
        let (position, _) = cursor.next().unwrap().unwrap();
        assert_eq!(position, LogPosition::new(0, entry_size));
        assert_eq!(cursor.position(), LogPosition::new(0, 2 * entry_size));
        assert_eq!(tx_ids(&mut cursor), vec![3]);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn truncated_tail_is_clean_end() {
        let mut bytes = commits(1..3);
        bytes.truncate(bytes.len() - 5);
        let mut cursor = cursor(bytes);
        assert_eq!(tx_ids(&mut cursor), vec![1]);
    }

    #[test]
    fn zero_tail_is_clean_end() {
        let mut bytes = commits(1..3);
        bytes.extend_from_slice(&[0; 100]);
        let mut cursor = cursor(bytes);
        assert_eq!(tx_ids(&mut cursor), vec![1, 2]);
    }

    #[test]
    fn zero_byte_followed_by_data_is_corruption() {
        let mut bytes = commits(1..2);
        let boundary = bytes.len() as i64;
        bytes.push(0);
        bytes.extend(commits(2..3));
        let mut cursor = cursor(bytes);

        assert!(cursor.next().unwrap().is_ok());
        let err = cursor.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            LogError::LogCorruption { position, .. } if position == LogPosition::new(0, boundary)
        ));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn inflated_length_over_later_entries_is_corruption() {
        let command = LogEntry::Command(LogEntryCommand::new(
            KernelVersion::V5_0,
            Arc::new(RawCommand::new(b"payload".to_vec())),
        ));
        let mut channel = InMemoryClosableChannel::new();
        let writer = LogEntryWriter::new();
        writer.write_entry(&mut channel, &command).unwrap();
        let damaged = channel.write_position();
        writer.write_entry(&mut channel, &command).unwrap();
        let mut bytes = channel.as_bytes().to_vec();
        bytes.extend(commits(1..3));
        // Little-endian length 7 becomes 7 + 1 MiB.
        let length_at = damaged + command.layout().unwrap().header_size();
        bytes[length_at + 2] ^= 0x10;
        let mut cursor = cursor(bytes);

        assert!(cursor.next().unwrap().is_ok());
        let err = cursor.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            LogError::LogCorruption { position, .. } if position == LogPosition::new(0, damaged as i64)
        ));
        assert_eq!(cursor.position(), LogPosition::new(0, damaged as i64));
    }

    #[test]
    fn torn_command_at_the_tail_is_clean_end() {
        let command = LogEntry::Command(LogEntryCommand::new(
            KernelVersion::V5_0,
            Arc::new(RawCommand::new(vec![7; 200])),
        ));
        let mut bytes = commits(1..2);
        let mut channel = InMemoryClosableChannel::new();
        LogEntryWriter::new().write_entry(&mut channel, &command).unwrap();
        bytes.extend_from_slice(&channel.as_bytes()[..150]);
        let mut cursor = cursor(bytes);

        assert_eq!(tx_ids(&mut cursor), vec![1]);
    }
}
