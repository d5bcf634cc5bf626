//! Reading the log back.
//!
//! A [`LogEntryCursor`] replays entries from any position forward. The
//! [`LogTailScanner`] reads the whole log once at startup to find its end,
//! its last checkpoint and whether committed work must be replayed.
//!
//! # End of log versus corruption
//!
//! An unclean shutdown can leave a partially written entry, or a
//! zero-filled region, at the tail of the last segment. Both are treated
//! as the clean end of the log. A checksum mismatch, an inconsistent body,
//! or a zero version byte followed by anything other than zeros is
//! reported as [`crate::LogError::LogCorruption`] at the entry's start.

mod cursor;
mod tail;

pub use cursor::LogEntryCursor;
pub use tail::{CheckpointInfo, LogTailInformation, LogTailScanner};
