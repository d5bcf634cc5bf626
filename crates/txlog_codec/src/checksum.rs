//! Per-entry checksum accumulation.

use crc32fast::Hasher;

/// Running CRC-32 over the bytes of one log entry.
///
/// A channel resets its accumulator when an entry begins and reads or
/// writes the final value right after the entry body. One accumulator never
/// covers bytes of two entries.
#[derive(Debug, Clone, Default)]
pub struct Checksum {
    hasher: Hasher,
}

impl Checksum {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards everything accumulated so far.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Adds bytes to the accumulator.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Returns the checksum of the bytes accumulated so far.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Computes the checksum of a byte slice in one step.
    #[must_use]
    pub fn of(bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }
}
