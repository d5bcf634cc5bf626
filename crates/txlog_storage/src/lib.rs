//! # txlog storage
//!
//! Byte stores for the txlog transaction log.
//!
//! This crate is the lowest layer of the log. Backends are **opaque byte
//! stores**: they append, read and flush bytes and know nothing about log
//! entries, kernel versions or checksums.
//!
//! ## Layers
//!
//! - [`StorageBackend`] - one append-only byte range (one log segment)
//! - [`SegmentStore`] - the set of numbered segments making up a log
//!
//! ## Available Implementations
//!
//! - [`InMemoryBackend`] / [`InMemorySegmentStore`] - tests and ephemeral logs
//! - [`FileBackend`] / [`DirectorySegmentStore`] - segment files in a directory
//!
//! ## Example
//!
//! ```rust
//! use txlog_storage::{InMemorySegmentStore, SegmentStore, StorageBackend};
//!
//! let store = InMemorySegmentStore::new();
//! let mut segment = store.open_writer(0).unwrap();
//! segment.append(b"entry bytes").unwrap();
//!
//! let reader = store.open_reader(0).unwrap().unwrap();
//! assert_eq!(reader.read_at(0, 5).unwrap(), b"entry");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod segment;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use segment::{DirectorySegmentStore, InMemorySegmentStore, SegmentStore, SEGMENT_FILE_PREFIX};
