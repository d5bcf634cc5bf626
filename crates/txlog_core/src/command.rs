//! Storage commands carried by command entries.
//!
//! The log treats commands as opaque: a storage engine serializes its own
//! commands and supplies a [`CommandReaderFactory`] to decode them.

use crate::error::{LogError, LogResult};
use crate::kernel_version::KernelVersion;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use txlog_codec::{ReadableChannel, WritableChannel};

/// Largest payload a [`RawCommand`] may carry.
pub const MAX_RAW_COMMAND_SIZE: usize = 16 * 1024 * 1024;

/// A storage-engine command recorded in the log.
pub trait StorageCommand: fmt::Debug + Send + Sync {
    /// Writes the command body.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails or the command cannot be
    /// represented.
    fn serialize(&self, channel: &mut dyn WritableChannel) -> LogResult<()>;

    /// Returns the command as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Decodes command bodies for one storage engine.
pub trait CommandReaderFactory: Send + Sync {
    /// Decodes one command written under `kernel_version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel runs out of bytes or the body is
    /// malformed.
    fn decode(
        &self,
        kernel_version: KernelVersion,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<Arc<dyn StorageCommand>>;
}

/// A command whose body is a length-prefixed byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    bytes: Vec<u8>,
}

impl RawCommand {
    /// Creates a command.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns the payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl StorageCommand for RawCommand {
    fn serialize(&self, channel: &mut dyn WritableChannel) -> LogResult<()> {
        if self.bytes.len() > MAX_RAW_COMMAND_SIZE {
            return Err(LogError::invalid_argument(format!(
                "command too large: {} bytes exceeds maximum of {} bytes",
                self.bytes.len(),
                MAX_RAW_COMMAND_SIZE
            )));
        }
        // Bounded by MAX_RAW_COMMAND_SIZE above.
        channel.put_i32(self.bytes.len() as i32)?;
        channel.put(&self.bytes)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Decodes [`RawCommand`]s for every kernel version.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCommandReaderFactory;

impl CommandReaderFactory for RawCommandReaderFactory {
    fn decode(
        &self,
        _kernel_version: KernelVersion,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<Arc<dyn StorageCommand>> {
        let len = channel.get_i32()?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_RAW_COMMAND_SIZE)
            .ok_or_else(|| LogError::malformed(format!("illegal command length {len}")))?;
        let mut bytes = vec![0u8; len];
        channel.get(&mut bytes)?;
        Ok(Arc::new(RawCommand::new(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_codec::InMemoryClosableChannel;

    #[test]
    fn raw_command_round_trip() {
        let mut channel = InMemoryClosableChannel::new();
        RawCommand::new(b"create node".to_vec())
            .serialize(&mut channel)
            .unwrap();

        let decoded = RawCommandReaderFactory
            .decode(KernelVersion::LATEST, &mut channel)
            .unwrap();
        let raw = decoded.as_any().downcast_ref::<RawCommand>().unwrap();
        assert_eq!(raw.bytes(), b"create node");
    }

    #[test]
    fn negative_length_is_malformed() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put_i32(-1).unwrap();

        let err = RawCommandReaderFactory
            .decode(KernelVersion::LATEST, &mut channel)
            .unwrap_err();
        assert!(matches!(err, LogError::LogCorruption { .. }));
    }

    #[test]
    fn truncated_body_is_end_of_channel() {
        let mut channel = InMemoryClosableChannel::new();
        channel.put_i32(10).unwrap();
        channel.put(b"abc").unwrap();

        let err = RawCommandReaderFactory
            .decode(KernelVersion::LATEST, &mut channel)
            .unwrap_err();
        assert!(err.is_end_of_channel());
    }
}
