//! Entry headers.

use super::EntryType;
use crate::kernel_version::KernelVersion;

/// The part of an entry read before its layout is known.
///
/// `field_count` is read from the wire for framed layouts and implied by
/// the layout otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryHeader {
    /// Kernel version of the entry.
    pub kernel_version: KernelVersion,
    /// Type of the entry.
    pub entry_type: EntryType,
    /// Number of body fields the header declares.
    pub field_count: u8,
}

impl LogEntryHeader {
    /// Creates a header.
    #[must_use]
    pub const fn new(kernel_version: KernelVersion, entry_type: EntryType, field_count: u8) -> Self {
        Self {
            kernel_version,
            entry_type,
            field_count,
        }
    }
}
