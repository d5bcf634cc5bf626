//! Kernel versions.

use std::fmt;
use txlog_codec::ByteOrder;

/// Format-compatibility tag stamped on every log entry.
///
/// The tag is the first byte of an entry and selects, together with the
/// entry type, the layout used for the rest of the entry. It is independent
/// of the software release version.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum KernelVersion {
    /// 4.2 format.
    V4_2 = 2,
    /// 4.3 drop 4 format; first version with detached checkpoints.
    V4_3_D4 = 3,
    /// 4.4 format.
    V4_4 = 4,
    /// 5.0 format; little-endian bodies and consensus index on start.
    V5_0 = 5,
}

impl KernelVersion {
    /// The newest version this build writes and reads.
    pub const LATEST: Self = Self::V5_0;

    /// All known versions in ascending order.
    pub const ALL: [Self; 4] = [Self::V4_2, Self::V4_3_D4, Self::V4_4, Self::V5_0];

    /// Returns the version byte.
    #[must_use]
    pub const fn version(self) -> u8 {
        self as u8
    }

    /// Converts a version byte to a kernel version.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(Self::V4_2),
            3 => Some(Self::V4_3_D4),
            4 => Some(Self::V4_4),
            5 => Some(Self::V5_0),
            _ => None,
        }
    }

    /// Returns the byte order of entry bodies written under this version.
    #[must_use]
    pub const fn byte_order(self) -> ByteOrder {
        match self {
            Self::V4_2 | Self::V4_3_D4 | Self::V4_4 => ByteOrder::BigEndian,
            Self::V5_0 => ByteOrder::LittleEndian,
        }
    }

    /// Returns true if this version is `other` or newer.
    #[must_use]
    pub fn is_at_least(self, other: Self) -> bool {
        self >= other
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V4_2 => "V4_2",
            Self::V4_3_D4 => "V4_3_D4",
            Self::V4_4 => "V4_4",
            Self::V5_0 => "V5_0",
        };
        f.write_str(name)
    }
}
