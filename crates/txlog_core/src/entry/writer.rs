//! Entry encoding.

use super::{LogEntry, LogEntryDetachedCheckpoint};
use crate::error::LogResult;
use crate::kernel_version::KernelVersion;
use crate::position::LogPosition;
use crate::store_id::StoreId;
use txlog_codec::WritableChannel;

/// Writes entries in the layout of their kernel version.
///
/// The writer is stateless. Each call opens a checksum before the header,
/// writes the body, and appends the checksum right after it, so no
/// checksum ever spans two entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEntryWriter;

impl LogEntryWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Writes one entry and returns its checksum.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::UnsupportedEntryVersion`] if the entry's
    /// kernel version has no layout for its type, or an error if the
    /// channel fails.
    pub fn write_entry<C: WritableChannel>(
        &self,
        channel: &mut C,
        entry: &LogEntry,
    ) -> LogResult<u32> {
        let version = entry.kernel_version();
        let layout = entry.layout()?;

        channel.set_byte_order(version.byte_order());
        channel.begin_write_checksum();
        channel.put_u8(version.version())?;
        channel.put_u8(entry.entry_type().code())?;
        if layout.is_framed() {
            channel.put_u8(layout.field_count())?;
        }
        layout.write(entry, channel)?;
        Ok(channel.put_checksum()?)
    }

    /// Writes a checkpoint entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `kernel_version` has no checkpoint layout or the
    /// channel fails.
    pub fn write_detached_checkpoint<C: WritableChannel>(
        &self,
        channel: &mut C,
        kernel_version: KernelVersion,
        log_position: LogPosition,
        checkpoint_time_millis: i64,
        store_id: StoreId,
        reason: &str,
    ) -> LogResult<u32> {
        let entry = LogEntryDetachedCheckpoint::new(
            kernel_version,
            log_position,
            checkpoint_time_millis,
            store_id,
            reason,
        );
        self.write_entry(channel, &LogEntry::DetachedCheckpoint(entry))
    }
}
