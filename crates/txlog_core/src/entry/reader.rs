//! Entry decoding.

use super::{EntryLayout, EntryType, LogEntry, LogEntryHeader};
use crate::channel::PositionAwareChannel;
use crate::command::CommandReaderFactory;
use crate::error::{LogError, LogResult};
use crate::kernel_version::KernelVersion;
use std::fmt;
use std::sync::Arc;
use txlog_codec::{CodecError, ReadableChannel};

/// Reads entries of any supported kernel version.
///
/// The version byte of each entry selects its layout, so one channel may
/// carry entries of several versions. Versions newer than the configured
/// latest are rejected rather than guessed at.
#[derive(Clone)]
pub struct VersionAwareLogEntryReader {
    commands: Arc<dyn CommandReaderFactory>,
    latest: KernelVersion,
}

impl fmt::Debug for VersionAwareLogEntryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionAwareLogEntryReader")
            .field("latest", &self.latest)
            .finish_non_exhaustive()
    }
}

impl VersionAwareLogEntryReader {
    /// Creates a reader supporting every known kernel version.
    #[must_use]
    pub fn new(commands: Arc<dyn CommandReaderFactory>) -> Self {
        Self::with_latest_version(commands, KernelVersion::LATEST)
    }

    /// Creates a reader supporting versions up to `latest`.
    #[must_use]
    pub fn with_latest_version(
        commands: Arc<dyn CommandReaderFactory>,
        latest: KernelVersion,
    ) -> Self {
        Self { commands, latest }
    }

    /// Returns the newest kernel version this reader accepts.
    #[must_use]
    pub fn latest_version(&self) -> KernelVersion {
        self.latest
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` when the channel holds no further entry: it is
    /// exhausted, ends inside an entry, or the next version byte is zero.
    /// Telling a zero-filled tail from damage is left to the caller, which
    /// can see what follows.
    ///
    /// # Errors
    ///
    /// - [`LogError::UnsupportedEntryVersion`] for unknown or too new
    ///   versions and types
    /// - [`LogError::IllegalStructSize`] for a wrong declared field count
    /// - [`LogError::LogCorruption`] at the entry's start position for a
    ///   checksum mismatch or an inconsistent body
    pub fn read_log_entry<C: PositionAwareChannel>(
        &self,
        channel: &mut C,
    ) -> LogResult<Option<LogEntry>> {
        let start = channel.current_position();
        match self.read_entry(channel) {
            Err(e) if e.is_end_of_channel() => Ok(None),
            Err(e) => Err(e.at_position(start)),
            Ok(entry) => Ok(entry),
        }
    }

    fn read_entry(&self, channel: &mut dyn ReadableChannel) -> LogResult<Option<LogEntry>> {
        channel.begin_read_checksum();
        let version_byte = channel.get_u8()?;
        if version_byte == 0 {
            return Ok(None);
        }
        let type_code = channel.get_u8()?;

        let version = KernelVersion::from_byte(version_byte)
            .filter(|version| *version <= self.latest)
            .ok_or_else(|| LogError::unsupported(version_byte, type_code))?;
        let entry_type = EntryType::from_code(type_code)
            .ok_or_else(|| LogError::unsupported(version_byte, type_code))?;
        let layout = EntryLayout::lookup(version, entry_type)?;

        channel.set_byte_order(version.byte_order());
        let field_count = if layout.is_framed() {
            channel.get_u8()?
        } else {
            layout.field_count()
        };
        let header = LogEntryHeader::new(version, entry_type, field_count);
        let body = layout.parse(&header, channel, self.commands.as_ref())?;

        channel
            .end_checksum_and_validate()
            .map_err(|e| match e {
                CodecError::ChecksumMismatch { expected, actual } => LogError::malformed(format!(
                    "checksum mismatch in {entry_type:?} entry: stored {expected:#010x}, computed {actual:#010x}"
                )),
                other => other.into(),
            })?;

        body.into_entry(version).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{RawCommand, RawCommandReaderFactory};
    use crate::entry::{
        LogEntryCommand, LogEntryCommit, LogEntryDetachedCheckpoint, LogEntryStart,
        LogEntryWriter, MAX_DESCRIPTION_LENGTH,
    };
    use crate::position::LogPosition;
    use crate::store_id::StoreId;
    use proptest::prelude::*;
    use txlog_codec::{InMemoryClosableChannel, WritableChannel};

    fn reader() -> VersionAwareLogEntryReader {
        VersionAwareLogEntryReader::new(Arc::new(RawCommandReaderFactory))
    }

    fn encode(entries: &[LogEntry]) -> InMemoryClosableChannel {
        let mut channel = InMemoryClosableChannel::new();
        for entry in entries {
            LogEntryWriter::new().write_entry(&mut channel, entry).unwrap();
        }
        channel
    }

    fn checkpoint(version: KernelVersion, reason: &str) -> LogEntry {
        LogEntry::from(LogEntryDetachedCheckpoint::new(
            version,
            LogPosition::new(3, 1_024),
            1_700_000_000_000,
            StoreId::legacy(42, -7),
            reason,
        ))
    }

    fn transaction(version: KernelVersion, tx_id: i64) -> Vec<LogEntry> {
        vec![
            LogEntryStart::new(version, 10, tx_id - 1, 77, -5, b"header".to_vec()).into(),
            LogEntryCommand::new(version, Arc::new(RawCommand::new(b"set x".to_vec()))).into(),
            LogEntryCommit::new(version, tx_id, 11).into(),
        ]
    }

    #[test]
    fn every_version_round_trips_transactions() {
        for version in KernelVersion::ALL {
            let entries = transaction(version, 5);
            let mut channel = encode(&entries);
            for expected in &entries {
                let read = reader().read_log_entry(&mut channel).unwrap().unwrap();
                assert_eq!(&read, expected);
                assert_eq!(read.kernel_version(), version);
            }
            assert!(reader().read_log_entry(&mut channel).unwrap().is_none());
        }
    }

    #[test]
    fn versions_mix_in_one_stream() {
        let entries = [
            checkpoint(KernelVersion::V4_4, "first"),
            checkpoint(KernelVersion::V5_0, "second"),
        ];
        let mut channel = encode(&entries);

        let first = reader().read_log_entry(&mut channel).unwrap().unwrap();
        let second = reader().read_log_entry(&mut channel).unwrap().unwrap();
        assert_eq!(first.kernel_version(), KernelVersion::V4_4);
        assert_eq!(second.kernel_version(), KernelVersion::V5_0);
        assert_eq!(first, entries[0]);
        assert_eq!(second, entries[1]);
    }

    #[test]
    fn empty_channel_is_end_of_log() {
        let mut channel = InMemoryClosableChannel::new();
        assert!(reader().read_log_entry(&mut channel).unwrap().is_none());
    }

    #[test]
    fn zero_version_byte_is_end_of_log() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[0, 0, 0, 0]);
        assert!(reader().read_log_entry(&mut channel).unwrap().is_none());
        assert_eq!(channel.read_position(), 1);
    }

    #[test]
    fn truncated_entry_is_end_of_log() {
        let full = encode(&[checkpoint(KernelVersion::V4_4, "cut")]);
        for len in 1..full.write_position() {
            let mut channel = InMemoryClosableChannel::from_bytes(&full.as_bytes()[..len]);
            assert!(
                reader().read_log_entry(&mut channel).unwrap().is_none(),
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn flipped_checksum_is_corruption_at_entry_start() {
        let mut channel = encode(&transaction(KernelVersion::V5_0, 9));
        let last = channel.write_position() - 1;
        channel.bytes_mut()[last] ^= 0x01;

        let r = reader();
        r.read_log_entry(&mut channel).unwrap().unwrap();
        r.read_log_entry(&mut channel).unwrap().unwrap();
        let commit_start = channel.read_position();

        let err = r.read_log_entry(&mut channel).unwrap_err();
        match err {
            LogError::LogCorruption { position, .. } => {
                assert_eq!(position, LogPosition::new(0, commit_start as i64));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[9, 5, 2]);
        let err = reader().read_log_entry(&mut channel).unwrap_err();
        assert!(matches!(
            err,
            LogError::UnsupportedEntryVersion {
                kernel_version: 9,
                entry_type: 5
            }
        ));
    }

    #[test]
    fn version_newer_than_latest_is_unsupported() {
        let mut channel = encode(&[checkpoint(KernelVersion::V5_0, "new")]);
        let old = VersionAwareLogEntryReader::with_latest_version(
            Arc::new(RawCommandReaderFactory),
            KernelVersion::V4_4,
        );
        let err = old.read_log_entry(&mut channel).unwrap_err();
        assert!(matches!(
            err,
            LogError::UnsupportedEntryVersion {
                kernel_version: 5,
                entry_type: 7
            }
        ));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[5, 2, 0]);
        let err = reader().read_log_entry(&mut channel).unwrap_err();
        assert!(matches!(err, LogError::UnsupportedEntryVersion { entry_type: 2, .. }));
    }

    #[test]
    fn checkpoint_under_4_2_is_unsupported() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[2, 7]);
        let err = reader().read_log_entry(&mut channel).unwrap_err();
        assert!(matches!(
            err,
            LogError::UnsupportedEntryVersion {
                kernel_version: 2,
                entry_type: 7
            }
        ));
    }

    #[test]
    fn wrong_field_count_is_illegal_struct_size() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put(&[4, 5, 0]).unwrap();
        channel.put(&[0u8; 32]).unwrap();

        let err = reader().read_log_entry(&mut channel).unwrap_err();
        assert!(matches!(
            err,
            LogError::IllegalStructSize {
                expected: 2,
                actual: 0
            }
        ));
        assert_eq!(channel.read_position(), 3);
    }

    fn checkpoint_version() -> impl Strategy<Value = KernelVersion> {
        prop_oneof![
            Just(KernelVersion::V4_3_D4),
            Just(KernelVersion::V4_4),
            Just(KernelVersion::V5_0),
        ]
    }

    proptest! {
        #[test]
        fn checkpoint_round_trip(
            version in checkpoint_version(),
            log_version in 0i64..i64::MAX,
            byte_offset in 0i64..i64::MAX,
            millis in any::<i64>(),
            creation in any::<i64>(),
            random in any::<i64>(),
            reason in proptest::collection::vec(any::<char>(), 0..=2 * MAX_DESCRIPTION_LENGTH)
                .prop_map(|chars| chars.into_iter().collect::<String>()),
        ) {
            let store_id = StoreId::legacy(creation, random);
            let position = LogPosition::new(log_version, byte_offset);
            let entry = LogEntryDetachedCheckpoint::new(version, position, millis, store_id.clone(), &reason);
            let mut channel = encode(&[entry.into()]);

            let read = reader().read_log_entry(&mut channel).unwrap().unwrap();
            let LogEntry::DetachedCheckpoint(read) = read else {
                return Err(TestCaseError::fail("not a checkpoint"));
            };
            prop_assert_eq!(read.kernel_version(), version);
            prop_assert_eq!(read.log_position(), position);
            prop_assert_eq!(read.checkpoint_time_millis(), millis);
            prop_assert_eq!(read.store_id(), &store_id);
            let kept = read.reason().len();
            prop_assert!(kept <= MAX_DESCRIPTION_LENGTH);
            prop_assert_eq!(read.reason(), &reason[..kept]);
            if let Some(next) = reason[kept..].chars().next() {
                prop_assert!(kept + next.len_utf8() > MAX_DESCRIPTION_LENGTH);
            }
        }

        #[test]
        fn any_wrong_field_count_is_rejected_before_the_body(
            version in prop_oneof![Just(KernelVersion::V4_4), Just(KernelVersion::V5_0)],
            entry_type in prop_oneof![
                Just(EntryType::TxStart),
                Just(EntryType::Command),
                Just(EntryType::TxCommit),
            ],
            declared in any::<u8>(),
        ) {
            let required = EntryLayout::lookup(version, entry_type).unwrap().field_count();
            prop_assume!(declared != required);

            let mut channel = InMemoryClosableChannel::new();
            channel.put(&[version.version(), entry_type.code(), declared]).unwrap();
            channel.put(&[0xAB; 64]).unwrap();

            let err = reader().read_log_entry(&mut channel).unwrap_err();
            let is_struct_size = matches!(
                err,
                LogError::IllegalStructSize { expected, actual }
                    if expected == required && actual == declared
            );
            prop_assert!(is_struct_size);
            prop_assert_eq!(channel.read_position(), 3);
        }
    }
}
