//! In-memory channel.

use crate::channel::{ByteOrder, OrderedChannel, ReadableChannel, WritableChannel};
use crate::checksum::Checksum;
use crate::error::{CodecError, CodecResult};
use bytes::{BufMut, BytesMut};

/// A readable and writable in-memory channel.
///
/// Writes append to a growable buffer; reads consume from an independent
/// cursor. Read and write checksums are tracked separately, so one channel
/// can carry an entry from the writer to the reader in tests.
///
/// # Example
///
/// ```rust
/// use txlog_codec::{InMemoryClosableChannel, ReadableChannel, WritableChannel};
///
/// let mut channel = InMemoryClosableChannel::new();
/// channel.begin_write_checksum();
/// channel.put_i64(42).unwrap();
/// channel.put_checksum().unwrap();
///
/// channel.begin_read_checksum();
/// assert_eq!(channel.get_i64().unwrap(), 42);
/// channel.end_checksum_and_validate().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryClosableChannel {
    buffer: BytesMut,
    read_position: usize,
    order: ByteOrder,
    read_checksum: Checksum,
    write_checksum: Checksum,
    closed: bool,
}

impl InMemoryClosableChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty channel with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Creates a channel whose readable content is `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buffer: BytesMut::from(bytes),
            ..Self::default()
        }
    }

    /// Returns the offset of the next byte to read.
    #[must_use]
    pub fn read_position(&self) -> usize {
        self.read_position
    }

    /// Moves the read cursor.
    ///
    /// # Errors
    ///
    /// Returns an end-of-channel error if `position` is past the written
    /// bytes.
    pub fn set_read_position(&mut self, position: usize) -> CodecResult<()> {
        if position > self.buffer.len() {
            return Err(CodecError::eof(position, self.buffer.len()));
        }
        self.read_position = position;
        Ok(())
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn write_position(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.read_position
    }

    /// Returns all bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns a mutable view of the written bytes.
    ///
    /// Tests use this to damage encoded entries.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Discards all content and resets both cursors and checksums.
    ///
    /// The byte order and closed state are kept.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_position = 0;
        self.read_checksum.reset();
        self.write_checksum.reset();
    }

    /// Closes the channel for writing. Unread bytes stay readable.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Returns true if the channel was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl OrderedChannel for InMemoryClosableChannel {
    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }
}

impl ReadableChannel for InMemoryClosableChannel {
    fn get(&mut self, dst: &mut [u8]) -> CodecResult<()> {
        let available = self.remaining();
        if dst.len() > available {
            return Err(CodecError::eof(dst.len(), available));
        }
        let end = self.read_position + dst.len();
        let src = &self.buffer[self.read_position..end];
        dst.copy_from_slice(src);
        self.read_checksum.update(src);
        self.read_position = end;
        Ok(())
    }

    fn begin_read_checksum(&mut self) {
        self.read_checksum.reset();
    }

    fn read_checksum(&self) -> u32 {
        self.read_checksum.value()
    }
}

impl WritableChannel for InMemoryClosableChannel {
    fn put(&mut self, src: &[u8]) -> CodecResult<()> {
        if self.closed {
            return Err(CodecError::Closed);
        }
        self.buffer.put_slice(src);
        self.write_checksum.update(src);
        Ok(())
    }

    fn begin_write_checksum(&mut self) {
        self.write_checksum.reset();
    }

    fn write_checksum(&self) -> u32 {
        self.write_checksum.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_layout() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put_i32(0x0102_0304).unwrap();
        channel.put_i16(0x0506).unwrap();
        assert_eq!(channel.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn little_endian_layout() {
        let mut channel = InMemoryClosableChannel::new();
        channel.set_byte_order(ByteOrder::LittleEndian);
        channel.put_i32(0x0102_0304).unwrap();
        assert_eq!(channel.as_bytes(), &[4, 3, 2, 1]);
        assert_eq!(channel.get_i32().unwrap(), 0x0102_0304);
    }

    #[test]
    fn mixed_orders_in_one_stream() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put_i64(-7).unwrap();
        channel.set_byte_order(ByteOrder::LittleEndian);
        channel.put_i64(-7).unwrap();

        channel.set_byte_order(ByteOrder::BigEndian);
        assert_eq!(channel.get_i64().unwrap(), -7);
        channel.set_byte_order(ByteOrder::LittleEndian);
        assert_eq!(channel.get_i64().unwrap(), -7);
    }

    #[test]
    fn short_read_consumes_nothing() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[1, 2, 3]);
        let err = channel.get_i64().unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedEof {
                needed: 8,
                available: 3
            }
        ));
        assert_eq!(channel.read_position(), 0);
        assert_eq!(channel.get_u8().unwrap(), 1);
    }

    #[test]
    fn checksum_round_trip() {
        let mut channel = InMemoryClosableChannel::new();
        channel.begin_write_checksum();
        channel.put_u8(9).unwrap();
        channel.put_i64(1234).unwrap();
        let written = channel.put_checksum().unwrap();

        channel.begin_read_checksum();
        assert_eq!(channel.get_u8().unwrap(), 9);
        assert_eq!(channel.get_i64().unwrap(), 1234);
        assert_eq!(channel.read_checksum(), written);
        channel.end_checksum_and_validate().unwrap();
        assert_eq!(channel.remaining(), 0);
    }

    #[test]
    fn checksum_detects_flipped_byte() {
        let mut channel = InMemoryClosableChannel::new();
        channel.begin_write_checksum();
        channel.put_i64(1234).unwrap();
        channel.put_checksum().unwrap();
        channel.bytes_mut()[3] ^= 0x10;

        channel.begin_read_checksum();
        channel.get_i64().unwrap();
        assert!(matches!(
            channel.end_checksum_and_validate(),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn checksums_are_per_entry() {
        let mut channel = InMemoryClosableChannel::new();
        channel.begin_write_checksum();
        channel.put_i32(1).unwrap();
        channel.put_checksum().unwrap();
        channel.begin_write_checksum();
        channel.put_i32(1).unwrap();
        channel.put_checksum().unwrap();

        // Identical entries carry identical checksums.
        assert_eq!(channel.as_bytes()[4..8], channel.as_bytes()[12..16]);
    }

    #[test]
    fn closed_channel_rejects_writes_but_stays_readable() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put_u8(1).unwrap();
        channel.close();

        assert!(channel.is_closed());
        assert!(matches!(channel.put_u8(2), Err(CodecError::Closed)));
        assert_eq!(channel.get_u8().unwrap(), 1);
    }

    #[test]
    fn set_read_position_bounds() {
        let mut channel = InMemoryClosableChannel::from_bytes(&[0, 0, 7]);
        channel.set_read_position(2).unwrap();
        assert_eq!(channel.get_u8().unwrap(), 7);
        assert!(channel.set_read_position(4).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn order_strategy() -> impl Strategy<Value = ByteOrder> {
            prop_oneof![Just(ByteOrder::BigEndian), Just(ByteOrder::LittleEndian)]
        }

        proptest! {
            #[test]
            fn typed_values_read_back(
                order in order_strategy(),
                a in any::<i16>(),
                b in any::<i32>(),
                c in any::<i64>(),
            ) {
                let mut channel = InMemoryClosableChannel::new();
                channel.set_byte_order(order);
                channel.put_i16(a).unwrap();
                channel.put_i32(b).unwrap();
                channel.put_i64(c).unwrap();

                prop_assert_eq!(channel.get_i16().unwrap(), a);
                prop_assert_eq!(channel.get_i32().unwrap(), b);
                prop_assert_eq!(channel.get_i64().unwrap(), c);
            }
        }
    }
}
