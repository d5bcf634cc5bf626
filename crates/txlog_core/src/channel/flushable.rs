//! Buffered writing into a segment.

use crate::position::LogPosition;
use bytes::{BufMut, BytesMut};
use std::fmt;
use txlog_codec::{ByteOrder, Checksum, CodecResult, OrderedChannel, WritableChannel};
use txlog_storage::{StorageBackend, StorageError, StorageResult};

/// Initial capacity of the write buffer.
const WRITE_BUFFER_CAPACITY: usize = 64 * 1024;

/// A writable channel over one segment.
///
/// Bytes collect in memory until [`flush`](Self::flush) appends them to
/// the backend, so a segment only ever receives whole batches. The channel
/// is bound to a single version; rotation replaces the channel.
pub struct PhysicalFlushableLogChannel {
    version: i64,
    backend: Box<dyn StorageBackend>,
    buffer: BytesMut,
    /// Bytes already handed to the backend.
    flushed: u64,
    /// Set when a failed append left bytes that could not be cut off.
    partial_write_at: Option<u64>,
    sync_on_flush: bool,
    order: ByteOrder,
    checksum: Checksum,
}

impl PhysicalFlushableLogChannel {
    /// Creates a channel appending to `backend` after its current content.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(
        version: i64,
        backend: Box<dyn StorageBackend>,
        sync_on_flush: bool,
    ) -> StorageResult<Self> {
        let flushed = backend.size()?;
        Ok(Self {
            version,
            backend,
            buffer: BytesMut::with_capacity(WRITE_BUFFER_CAPACITY),
            flushed,
            partial_write_at: None,
            sync_on_flush,
            order: ByteOrder::default(),
            checksum: Checksum::new(),
        })
    }

    /// Returns the segment version.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the position of the next byte written, buffered bytes
    /// included.
    #[must_use]
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.version, self.size() as i64)
    }

    /// Returns the segment size including buffered bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.flushed + self.buffer.len() as u64
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Appends buffered bytes to the backend, syncing if configured.
    ///
    /// Returns the position everything before which is flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails. Buffered bytes are kept and
    /// whatever part of them reached the segment is cut off again, so a
    /// later flush retries from the same position. If the cut itself fails
    /// every later flush returns [`StorageError::PartialWrite`].
    pub fn flush(&mut self) -> StorageResult<LogPosition> {
        self.write_out()?;
        if self.sync_on_flush {
            self.backend.sync()?;
        }
        Ok(self.position())
    }

    /// Appends buffered bytes and syncs regardless of configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn force(&mut self) -> StorageResult<LogPosition> {
        self.write_out()?;
        self.backend.sync()?;
        Ok(self.position())
    }

    fn write_out(&mut self) -> StorageResult<()> {
        if let Some(offset) = self.partial_write_at {
            return Err(StorageError::PartialWrite { offset });
        }
        if !self.buffer.is_empty() {
            if let Err(e) = self.backend.append(&self.buffer) {
                self.discard_partial_write();
                return Err(e);
            }
            self.flushed += self.buffer.len() as u64;
            self.buffer.clear();
        }
        self.backend.flush()
    }

    fn discard_partial_write(&mut self) {
        let clean = matches!(self.backend.size(), Ok(size) if size == self.flushed)
            || self.backend.truncate(self.flushed).is_ok();
        if !clean {
            tracing::error!(
                version = self.version,
                offset = self.flushed,
                "failed to remove partial write from log segment"
            );
            self.partial_write_at = Some(self.flushed);
        }
    }
}

impl fmt::Debug for PhysicalFlushableLogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalFlushableLogChannel")
            .field("version", &self.version)
            .field("flushed", &self.flushed)
            .field("pending", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl OrderedChannel for PhysicalFlushableLogChannel {
    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }
}

impl WritableChannel for PhysicalFlushableLogChannel {
    fn put(&mut self, src: &[u8]) -> CodecResult<()> {
        self.buffer.put_slice(src);
        self.checksum.update(src);
        Ok(())
    }

    fn begin_write_checksum(&mut self) {
        self.checksum.reset();
    }

    fn write_checksum(&self) -> u32 {
        self.checksum.value()
    }
}
