//! Buffered reading across segments.

use super::{FlushedPosition, LogVersionBridge, NoMoreChannels, PositionAwareChannel};
use crate::log::ReaderRegistration;
use crate::position::LogPosition;
use std::cmp::Ordering;
use std::fmt;
use txlog_codec::{ByteOrder, Checksum, CodecError, CodecResult, OrderedChannel, ReadableChannel};
use txlog_storage::{StorageBackend, StorageResult};

/// A readable channel over the logical log.
///
/// Reads are served from a read-ahead buffer. When the current segment is
/// exhausted the channel asks its [`LogVersionBridge`] for the next one
/// and continues at byte 0 of it, so a caller sees one continuous stream.
///
/// A channel bounded by a [`FlushedPosition`] never reads bytes the writer
/// has not flushed yet, and only bridges out of segments the writer has
/// rotated away from.
pub struct ReadAheadLogChannel {
    version: i64,
    backend: Box<dyn StorageBackend>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    /// Segment offset of `buffer[0]`.
    buffer_start: u64,
    read_ahead_size: usize,
    bridge: Box<dyn LogVersionBridge>,
    flushed: Option<FlushedPosition>,
    registration: Option<ReaderRegistration>,
    order: ByteOrder,
    checksum: Checksum,
}

impl ReadAheadLogChannel {
    /// Creates a channel reading `backend` from `position`.
    ///
    /// The channel starts unbounded and without a bridge.
    #[must_use]
    pub fn new(position: LogPosition, backend: Box<dyn StorageBackend>, read_ahead_size: usize) -> Self {
        Self {
            version: position.log_version(),
            backend,
            buffer: Vec::new(),
            buffer_pos: 0,
            buffer_start: u64::try_from(position.byte_offset()).unwrap_or(0),
            read_ahead_size: read_ahead_size.max(1),
            bridge: Box::new(NoMoreChannels),
            flushed: None,
            registration: None,
            order: ByteOrder::default(),
            checksum: Checksum::new(),
        }
    }

    /// Continues into later segments through `bridge`.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Box<dyn LogVersionBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Limits reads to the flushed part of the log.
    #[must_use]
    pub fn bounded_by(mut self, flushed: FlushedPosition) -> Self {
        self.flushed = Some(flushed);
        self
    }

    /// Reports every segment change to `registration`.
    #[must_use]
    pub fn with_registration(mut self, registration: ReaderRegistration) -> Self {
        registration.advance_to(self.version);
        self.registration = Some(registration);
        self
    }

    /// Returns the version of the segment being read.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    fn offset(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    fn limit(&self) -> StorageResult<u64> {
        let size = self.backend.size()?;
        let Some(flushed) = &self.flushed else {
            return Ok(size);
        };
        let flushed = flushed.get();
        Ok(match self.version.cmp(&flushed.log_version()) {
            Ordering::Less => size,
            Ordering::Equal => size.min(u64::try_from(flushed.byte_offset()).unwrap_or(0)),
            Ordering::Greater => 0,
        })
    }

    fn may_bridge(&self) -> bool {
        self.flushed
            .as_ref()
            .map_or(true, |flushed| self.version < flushed.get().log_version())
    }

    /// Loads the next chunk of the current segment. Returns false at its end.
    fn refill(&mut self) -> StorageResult<bool> {
        let offset = self.offset();
        let limit = self.limit()?;
        if offset >= limit {
            return Ok(false);
        }
        let len = (limit - offset).min(self.read_ahead_size as u64) as usize;
        self.buffer = self.backend.read_at(offset, len)?;
        self.buffer_start = offset;
        self.buffer_pos = 0;
        Ok(true)
    }

    /// Moves to byte 0 of the next segment. Returns false if there is none.
    fn bridge(&mut self) -> StorageResult<bool> {
        if !self.may_bridge() {
            return Ok(false);
        }
        let Some(next) = self.bridge.next(self.version)? else {
            return Ok(false);
        };
        self.version += 1;
        self.backend = next;
        self.buffer.clear();
        self.buffer_pos = 0;
        self.buffer_start = 0;
        if let Some(registration) = &self.registration {
            registration.advance_to(self.version);
        }
        tracing::debug!(version = self.version, "reader moved to next log segment");
        Ok(true)
    }

    /// Moves past exhausted segments so the current position is where the
    /// next byte will actually come from.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be read or opened.
    pub fn skip_exhausted_segments(&mut self) -> StorageResult<()> {
        while self.buffer_pos == self.buffer.len() && !self.refill()? {
            if !self.bridge()? {
                break;
            }
        }
        Ok(())
    }

    /// Reads the current segment from `offset` to its readable end,
    /// without moving the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be read.
    pub fn read_segment_from(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let limit = self.limit()?;
        if offset >= limit {
            return Ok(Vec::new());
        }
        self.backend.read_at(offset, (limit - offset) as usize)
    }

    /// Returns true if every readable byte left in the current segment is
    /// zero, consuming them.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be read.
    pub fn remaining_is_zeroed(&mut self) -> StorageResult<bool> {
        loop {
            if self.buffer[self.buffer_pos..].iter().any(|b| *b != 0) {
                return Ok(false);
            }
            self.buffer_pos = self.buffer.len();
            if !self.refill()? {
                return Ok(true);
            }
        }
    }
}

impl fmt::Debug for ReadAheadLogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAheadLogChannel")
            .field("position", &self.current_position())
            .field("bounded", &self.flushed.is_some())
            .finish_non_exhaustive()
    }
}

impl OrderedChannel for ReadAheadLogChannel {
    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }
}

impl ReadableChannel for ReadAheadLogChannel {
    fn get(&mut self, dst: &mut [u8]) -> CodecResult<()> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.buffer_pos == self.buffer.len() && !self.refill()? && !self.bridge()? {
                return Err(CodecError::eof(dst.len(), filled));
            }
            let n = (dst.len() - filled).min(self.buffer.len() - self.buffer_pos);
            let src = &self.buffer[self.buffer_pos..self.buffer_pos + n];
            dst[filled..filled + n].copy_from_slice(src);
            self.checksum.update(src);
            self.buffer_pos += n;
            filled += n;
        }
        Ok(())
    }

    fn begin_read_checksum(&mut self) {
        self.checksum.reset();
    }

    fn read_checksum(&self) -> u32 {
        self.checksum.value()
    }
}

impl PositionAwareChannel for ReadAheadLogChannel {
    fn current_position(&self) -> LogPosition {
        LogPosition::new(self.version, self.offset() as i64)
    }
}
