//! Log channels over segment backends.
//!
//! The writer appends through a [`PhysicalFlushableLogChannel`], which
//! buffers bytes and hands them to the current segment on flush. Readers
//! use a [`ReadAheadLogChannel`], which crosses from one segment into the
//! next through a [`LogVersionBridge`] and never reads past the flushed
//! position published by the writer.

mod bridge;
mod flushable;
mod read_ahead;

pub use bridge::{LogVersionBridge, NoMoreChannels, ReaderLogVersionBridge};
pub use flushable::PhysicalFlushableLogChannel;
pub use read_ahead::ReadAheadLogChannel;

use crate::position::LogPosition;
use parking_lot::RwLock;
use std::sync::Arc;
use txlog_codec::{InMemoryClosableChannel, ReadableChannel};

/// A readable channel that knows where in the log it is.
pub trait PositionAwareChannel: ReadableChannel {
    /// Returns the position of the next byte to read.
    fn current_position(&self) -> LogPosition;
}

/// An in-memory channel is treated as the whole of log version 0.
impl PositionAwareChannel for InMemoryClosableChannel {
    fn current_position(&self) -> LogPosition {
        // A Vec never holds more than isize::MAX bytes.
        LogPosition::new(0, self.read_position() as i64)
    }
}

/// The position up to which the log is flushed, shared between the writer
/// and its readers.
#[derive(Debug, Clone)]
pub struct FlushedPosition {
    inner: Arc<RwLock<LogPosition>>,
}

impl FlushedPosition {
    /// Creates a shared position.
    #[must_use]
    pub fn new(position: LogPosition) -> Self {
        Self {
            inner: Arc::new(RwLock::new(position)),
        }
    }

    /// Returns the current flushed position.
    #[must_use]
    pub fn get(&self) -> LogPosition {
        *self.inner.read()
    }

    /// Publishes a new flushed position.
    pub fn set(&self, position: LogPosition) {
        *self.inner.write() = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_codec::WritableChannel;

    #[test]
    fn memory_channel_position_follows_reads() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put(&[1, 2, 3]).unwrap();
        assert_eq!(channel.current_position(), LogPosition::new(0, 0));
        channel.get_u8().unwrap();
        assert_eq!(channel.current_position(), LogPosition::new(0, 1));
    }

    #[test]
    fn flushed_position_is_shared() {
        let flushed = FlushedPosition::new(LogPosition::START);
        let view = flushed.clone();
        flushed.set(LogPosition::new(1, 20));
        assert_eq!(view.get(), LogPosition::new(1, 20));
    }
}
