//! Typed channel traits.
//!
//! Entries are written through a [`WritableChannel`] and read back through
//! a [`ReadableChannel`]. Multi-byte values honour the channel's current
//! [`ByteOrder`], which the entry codec switches per entry because the byte
//! order is a property of the kernel version that wrote the entry.

use crate::error::{CodecError, CodecResult};

/// Byte order of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first.
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

/// A channel with a switchable byte order.
pub trait OrderedChannel {
    /// Returns the current byte order.
    fn byte_order(&self) -> ByteOrder;

    /// Sets the byte order used by subsequent multi-byte reads or writes.
    fn set_byte_order(&mut self, order: ByteOrder);
}

/// A source of typed values with checksum accumulation.
///
/// Implementors supply [`get`](ReadableChannel::get) and the checksum
/// bookkeeping; typed reads are provided.
pub trait ReadableChannel: OrderedChannel {
    /// Fills `dst` with the next bytes of the channel.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than `dst.len()`
    /// bytes remain. Implementations may have consumed some bytes by then.
    fn get(&mut self, dst: &mut [u8]) -> CodecResult<()>;

    /// Starts a new checksum at the current read position.
    fn begin_read_checksum(&mut self);

    /// Returns the checksum of the bytes read since the last
    /// [`begin_read_checksum`](ReadableChannel::begin_read_checksum).
    fn read_checksum(&self) -> u32;

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is exhausted.
    fn get_u8(&mut self) -> CodecResult<u8> {
        let mut buf = [0u8; 1];
        self.get(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a 16-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is exhausted.
    fn get_i16(&mut self) -> CodecResult<i16> {
        let mut buf = [0u8; 2];
        self.get(&mut buf)?;
        Ok(match self.byte_order() {
            ByteOrder::BigEndian => i16::from_be_bytes(buf),
            ByteOrder::LittleEndian => i16::from_le_bytes(buf),
        })
    }

    /// Reads a 32-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is exhausted.
    fn get_i32(&mut self) -> CodecResult<i32> {
        let mut buf = [0u8; 4];
        self.get(&mut buf)?;
        Ok(match self.byte_order() {
            ByteOrder::BigEndian => i32::from_be_bytes(buf),
            ByteOrder::LittleEndian => i32::from_le_bytes(buf),
        })
    }

    /// Reads a 32-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is exhausted.
    fn get_u32(&mut self) -> CodecResult<u32> {
        let mut buf = [0u8; 4];
        self.get(&mut buf)?;
        Ok(match self.byte_order() {
            ByteOrder::BigEndian => u32::from_be_bytes(buf),
            ByteOrder::LittleEndian => u32::from_le_bytes(buf),
        })
    }

    /// Reads a 64-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is exhausted.
    fn get_i64(&mut self) -> CodecResult<i64> {
        let mut buf = [0u8; 8];
        self.get(&mut buf)?;
        Ok(match self.byte_order() {
            ByteOrder::BigEndian => i64::from_be_bytes(buf),
            ByteOrder::LittleEndian => i64::from_le_bytes(buf),
        })
    }

    /// Reads the stored checksum and compares it with the accumulated one.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChecksumMismatch`] if they differ, or an
    /// end-of-channel error if the stored checksum is missing.
    fn end_checksum_and_validate(&mut self) -> CodecResult<()> {
        let actual = self.read_checksum();
        let expected = self.get_u32()?;
        if expected != actual {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }
}

/// A sink for typed values with checksum accumulation.
pub trait WritableChannel: OrderedChannel {
    /// Writes all of `src`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the underlying storage
    /// fails.
    fn put(&mut self, src: &[u8]) -> CodecResult<()>;

    /// Starts a new checksum at the current write position.
    fn begin_write_checksum(&mut self);

    /// Returns the checksum of the bytes written since the last
    /// [`begin_write_checksum`](WritableChannel::begin_write_checksum).
    fn write_checksum(&self) -> u32;

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_u8(&mut self, value: u8) -> CodecResult<()> {
        self.put(&[value])
    }

    /// Writes a 16-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_i16(&mut self, value: i16) -> CodecResult<()> {
        match self.byte_order() {
            ByteOrder::BigEndian => self.put(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&value.to_le_bytes()),
        }
    }

    /// Writes a 32-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_i32(&mut self, value: i32) -> CodecResult<()> {
        match self.byte_order() {
            ByteOrder::BigEndian => self.put(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&value.to_le_bytes()),
        }
    }

    /// Writes a 32-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_u32(&mut self, value: u32) -> CodecResult<()> {
        match self.byte_order() {
            ByteOrder::BigEndian => self.put(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&value.to_le_bytes()),
        }
    }

    /// Writes a 64-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_i64(&mut self, value: i64) -> CodecResult<()> {
        match self.byte_order() {
            ByteOrder::BigEndian => self.put(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&value.to_le_bytes()),
        }
    }

    /// Appends the accumulated checksum and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_checksum(&mut self) -> CodecResult<u32> {
        let checksum = self.write_checksum();
        self.put_u32(checksum)?;
        Ok(checksum)
    }
}
