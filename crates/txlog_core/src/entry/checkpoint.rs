//! Detached checkpoint entries.

use crate::error::{LogError, LogResult};
use crate::kernel_version::KernelVersion;
use crate::position::LogPosition;
use crate::store_id::StoreId;
use txlog_codec::{ReadableChannel, WritableChannel};

/// Bytes reserved for a checkpoint reason on the wire.
pub const MAX_DESCRIPTION_LENGTH: usize = 120;

/// A checkpoint recorded in the transaction log.
///
/// Everything before [`log_position`](Self::log_position) is reflected in
/// the store once this entry is durable, so recovery starts there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryDetachedCheckpoint {
    kernel_version: KernelVersion,
    log_position: LogPosition,
    checkpoint_time_millis: i64,
    store_id: StoreId,
    reason: String,
}

impl LogEntryDetachedCheckpoint {
    /// Creates a checkpoint entry.
    ///
    /// A reason longer than [`MAX_DESCRIPTION_LENGTH`] bytes is cut at the
    /// last character boundary that fits.
    #[must_use]
    pub fn new(
        kernel_version: KernelVersion,
        log_position: LogPosition,
        checkpoint_time_millis: i64,
        store_id: StoreId,
        reason: &str,
    ) -> Self {
        Self {
            kernel_version,
            log_position,
            checkpoint_time_millis,
            store_id,
            reason: truncate_reason(reason).to_owned(),
        }
    }

    /// Returns the kernel version the entry is written under.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Returns the position recovery starts from.
    #[must_use]
    pub fn log_position(&self) -> LogPosition {
        self.log_position
    }

    /// Returns when the checkpoint happened, in epoch millis.
    #[must_use]
    pub fn checkpoint_time_millis(&self) -> i64 {
        self.checkpoint_time_millis
    }

    /// Returns the identity of the checkpointed store.
    #[must_use]
    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    /// Returns why the checkpoint happened.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_DESCRIPTION_LENGTH {
        return reason;
    }
    let mut end = MAX_DESCRIPTION_LENGTH;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Wire shape of a checkpoint body.
///
/// The body is fixed-size. Three slots are kept for older readers and
/// writers: they are always read and written so the stream stays aligned,
/// but they carry no meaning for this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedCheckpointRecord {
    /// Segment version of the checkpoint target.
    pub log_version: i64,
    /// Byte offset of the checkpoint target.
    pub byte_offset: i64,
    /// Checkpoint time in epoch millis.
    pub checkpoint_time_millis: i64,
    /// Store creation time.
    pub store_creation_time: i64,
    /// Store random id.
    pub store_random_id: i64,
    /// Numeric store version from before store versions were named.
    /// Read and discarded.
    pub legacy_store_version: i64,
    /// Upgrade time of stores that were migrated in place. Always zero.
    pub legacy_upgrade_time: i64,
    /// Upgrade transaction of stores that were migrated in place. Always zero.
    pub legacy_upgrade_tx_id: i64,
    /// Number of meaningful bytes in `description`.
    pub description_length: i16,
    /// Reason bytes, zero padded.
    pub description: [u8; MAX_DESCRIPTION_LENGTH],
}

impl DetachedCheckpointRecord {
    /// Number of fields in the body.
    pub const FIELD_COUNT: u8 = 10;

    /// Size of the body in bytes.
    pub const BODY_SIZE: usize = 8 * 8 + 2 + MAX_DESCRIPTION_LENGTH;

    /// Builds the record for an entry.
    #[must_use]
    pub fn from_entry(entry: &LogEntryDetachedCheckpoint) -> Self {
        let reason = truncate_reason(&entry.reason).as_bytes();
        let mut description = [0u8; MAX_DESCRIPTION_LENGTH];
        description[..reason.len()].copy_from_slice(reason);

        Self {
            log_version: entry.log_position.log_version(),
            byte_offset: entry.log_position.byte_offset(),
            checkpoint_time_millis: entry.checkpoint_time_millis,
            store_creation_time: entry.store_id.creation_time(),
            store_random_id: entry.store_id.random_id(),
            legacy_store_version: 0,
            legacy_upgrade_time: 0,
            legacy_upgrade_tx_id: 0,
            // At most MAX_DESCRIPTION_LENGTH.
            description_length: reason.len() as i16,
            description,
        }
    }

    /// Reads a body. Consumes exactly [`Self::BODY_SIZE`] bytes on success.
    ///
    /// # Errors
    ///
    /// Returns an end-of-channel error if the body is incomplete.
    pub fn read(channel: &mut dyn ReadableChannel) -> LogResult<Self> {
        let log_version = channel.get_i64()?;
        let byte_offset = channel.get_i64()?;
        let checkpoint_time_millis = channel.get_i64()?;
        let store_creation_time = channel.get_i64()?;
        let store_random_id = channel.get_i64()?;
        let legacy_store_version = channel.get_i64()?;
        let legacy_upgrade_time = channel.get_i64()?;
        let legacy_upgrade_tx_id = channel.get_i64()?;
        let description_length = channel.get_i16()?;
        let mut description = [0u8; MAX_DESCRIPTION_LENGTH];
        channel.get(&mut description)?;

        Ok(Self {
            log_version,
            byte_offset,
            checkpoint_time_millis,
            store_creation_time,
            store_random_id,
            legacy_store_version,
            legacy_upgrade_time,
            legacy_upgrade_tx_id,
            description_length,
            description,
        })
    }

    /// Writes the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails.
    pub fn write(&self, channel: &mut dyn WritableChannel) -> LogResult<()> {
        channel.put_i64(self.log_version)?;
        channel.put_i64(self.byte_offset)?;
        channel.put_i64(self.checkpoint_time_millis)?;
        channel.put_i64(self.store_creation_time)?;
        channel.put_i64(self.store_random_id)?;
        channel.put_i64(self.legacy_store_version)?;
        channel.put_i64(self.legacy_upgrade_time)?;
        channel.put_i64(self.legacy_upgrade_tx_id)?;
        channel.put_i16(self.description_length)?;
        channel.put(&self.description)?;
        Ok(())
    }

    /// Converts a validated body into an entry.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the description length is outside
    /// `0..=MAX_DESCRIPTION_LENGTH`.
    pub fn into_entry(self, kernel_version: KernelVersion) -> LogResult<LogEntryDetachedCheckpoint> {
        let length = usize::try_from(self.description_length)
            .ok()
            .filter(|len| *len <= MAX_DESCRIPTION_LENGTH)
            .ok_or_else(|| {
                LogError::malformed(format!(
                    "illegal checkpoint description length {}",
                    self.description_length
                ))
            })?;
        let reason = String::from_utf8_lossy(&self.description[..length]);

        Ok(LogEntryDetachedCheckpoint::new(
            kernel_version,
            LogPosition::new(self.log_version, self.byte_offset),
            self.checkpoint_time_millis,
            StoreId::legacy(self.store_creation_time, self.store_random_id),
            &reason,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_codec::InMemoryClosableChannel;

    fn entry(reason: &str) -> LogEntryDetachedCheckpoint {
        LogEntryDetachedCheckpoint::new(
            KernelVersion::V5_0,
            LogPosition::new(1, 2),
            3,
            StoreId::legacy(4, 5),
            reason,
        )
    }

    #[test]
    fn long_reason_is_truncated() {
        let reason = "x".repeat(MAX_DESCRIPTION_LENGTH * 2);
        assert_eq!(entry(&reason).reason().len(), MAX_DESCRIPTION_LENGTH);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 119 ASCII bytes followed by a 2-byte character crossing the limit.
        let reason = format!("{}é", "a".repeat(MAX_DESCRIPTION_LENGTH - 1));
        let truncated = entry(&reason);
        assert_eq!(truncated.reason(), "a".repeat(MAX_DESCRIPTION_LENGTH - 1));
    }

    #[test]
    fn body_has_fixed_size() {
        let long = "y".repeat(500);
        for reason in ["", "short", long.as_str()] {
            let mut channel = InMemoryClosableChannel::new();
            DetachedCheckpointRecord::from_entry(&entry(reason))
                .write(&mut channel)
                .unwrap();
            assert_eq!(channel.write_position(), DetachedCheckpointRecord::BODY_SIZE);
        }
    }

    #[test]
    fn legacy_slots_are_consumed_and_ignored() {
        let mut channel = InMemoryClosableChannel::new();
        let mut record = DetachedCheckpointRecord::from_entry(&entry("legacy"));
        record.legacy_store_version = 123;
        record.write(&mut channel).unwrap();

        let read = DetachedCheckpointRecord::read(&mut channel).unwrap();
        assert_eq!(read.legacy_store_version, 123);
        assert_eq!(channel.remaining(), 0);
        assert_eq!(read.into_entry(KernelVersion::V5_0).unwrap(), entry("legacy"));
    }

    #[test]
    fn out_of_range_description_length_is_corruption() {
        for length in [-1i16, MAX_DESCRIPTION_LENGTH as i16 + 1] {
            let mut record = DetachedCheckpointRecord::from_entry(&entry("abc"));
            record.description_length = length;
            let err = record.into_entry(KernelVersion::V5_0).unwrap_err();
            assert!(matches!(err, LogError::LogCorruption { .. }));
        }
    }
}
