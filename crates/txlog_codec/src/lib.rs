//! # txlog codec
//!
//! Binary channel abstraction for the txlog transaction log.
//!
//! Log entries are written field by field through a [`WritableChannel`] and
//! read back through a [`ReadableChannel`]. Both traits:
//!
//! - provide typed 8/16/32/64-bit accessors honouring a per-channel
//!   [`ByteOrder`]
//! - accumulate a CRC-32 [`Checksum`] that covers exactly one entry
//! - are object safe, so the entry codec works against `dyn` channels
//!
//! ## Usage
//!
//! ```
//! use txlog_codec::{ByteOrder, InMemoryClosableChannel, OrderedChannel, ReadableChannel, WritableChannel};
//!
//! let mut channel = InMemoryClosableChannel::new();
//! channel.set_byte_order(ByteOrder::LittleEndian);
//! channel.begin_write_checksum();
//! channel.put_i16(7).unwrap();
//! channel.put_checksum().unwrap();
//!
//! channel.begin_read_checksum();
//! assert_eq!(channel.get_i16().unwrap(), 7);
//! channel.end_checksum_and_validate().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod checksum;
mod error;
mod memory;

pub use channel::{ByteOrder, OrderedChannel, ReadableChannel, WritableChannel};
pub use checksum::Checksum;
pub use error::{CodecError, CodecResult};
pub use memory::InMemoryClosableChannel;
