//! Numbered log segments.
//!
//! A transaction log is a sequence of segments numbered by log version.
//! Each segment is one [`StorageBackend`]. On disk the layout is:
//!
//! ```text
//! <log_dir>/
//! ├─ LOCK          # Advisory lock for the single writer
//! ├─ txlog.0
//! ├─ txlog.1
//! └─ txlog.2
//! ```

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// File name prefix of segment files; the log version follows after a dot.
pub const SEGMENT_FILE_PREFIX: &str = "txlog";

const LOCK_FILE: &str = "LOCK";

/// The set of segments backing one transaction log.
///
/// Versions are non-negative and a store never reorders them. The log layer
/// decides which versions exist; the store only creates, lists and removes
/// them.
pub trait SegmentStore: Send + Sync {
    /// Opens the segment for appending, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is read-only or the segment cannot be
    /// created.
    fn open_writer(&self, version: i64) -> StorageResult<Box<dyn StorageBackend>>;

    /// Opens a read-only handle on an existing segment.
    ///
    /// Returns `Ok(None)` if the segment does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment exists but cannot be opened.
    fn open_reader(&self, version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>>;

    /// Returns the versions of all resident segments in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn versions(&self) -> StorageResult<Vec<i64>>;

    /// Deletes a segment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SegmentNotFound`] if the segment does not
    /// exist, or an error if the store is read-only.
    fn remove(&self, version: i64) -> StorageResult<()>;

    /// Returns the last modification time of a segment in epoch millis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SegmentNotFound`] if the segment does not
    /// exist.
    fn modified_millis(&self, version: i64) -> StorageResult<i64>;
}

/// Segment files in a directory.
///
/// A writable store holds an exclusive lock on `LOCK` for as long as it
/// lives; a second writable open of the same directory fails with
/// [`StorageError::Locked`]. Read-only stores take no lock, so inspection
/// tools can read a log while its owner is running.
#[derive(Debug)]
pub struct DirectorySegmentStore {
    path: PathBuf,
    read_only: bool,
    _lock_file: Option<File>,
}

impl DirectorySegmentStore {
    /// Opens or creates a log directory for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another store holds the
    /// directory, or an I/O error if it cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            read_only: false,
            _lock_file: Some(lock_file),
        })
    }

    /// Opens an existing log directory without taking the writer lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("log directory does not exist: {}", path.display()),
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            read_only: true,
            _lock_file: None,
        })
    }

    /// Returns the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment file for `version`.
    #[must_use]
    pub fn segment_path(&self, version: i64) -> PathBuf {
        self.path.join(format!("{SEGMENT_FILE_PREFIX}.{version}"))
    }

    fn parse_version(file_name: &str) -> Option<i64> {
        let suffix = file_name.strip_prefix(SEGMENT_FILE_PREFIX)?.strip_prefix('.')?;
        suffix.parse::<i64>().ok().filter(|version| *version >= 0)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl SegmentStore for DirectorySegmentStore {
    fn open_writer(&self, version: i64) -> StorageResult<Box<dyn StorageBackend>> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let path = self.segment_path(version);
        let created = !path.exists();
        let backend = FileBackend::open(&path)?;
        if created {
            self.sync_directory()?;
            tracing::debug!(version, path = %path.display(), "created log segment");
        }
        Ok(Box::new(backend))
    }

    fn open_reader(&self, version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>> {
        let path = self.segment_path(version);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Box::new(FileBackend::open_read_only(&path)?)))
    }

    fn versions(&self) -> StorageResult<Vec<i64>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(version) = entry.file_name().to_str().and_then(Self::parse_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn remove(&self, version: i64) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let path = self.segment_path(version);
        if !path.exists() {
            return Err(StorageError::SegmentNotFound { version });
        }
        fs::remove_file(&path)?;
        self.sync_directory()?;
        Ok(())
    }

    fn modified_millis(&self, version: i64) -> StorageResult<i64> {
        let path = self.segment_path(version);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SegmentNotFound { version });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(epoch_millis(metadata.modified()?))
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[derive(Debug)]
struct MemorySegment {
    backend: InMemoryBackend,
    modified_millis: i64,
}

/// Segments held in memory.
///
/// Writers and readers of one version share a buffer, so a reader sees
/// bytes as soon as they are appended.
#[derive(Debug, Default)]
pub struct InMemorySegmentStore {
    segments: Mutex<BTreeMap<i64, MemorySegment>>,
}

impl InMemorySegmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle on a segment's bytes, if it exists.
    ///
    /// Tests use this to inspect or damage segment contents.
    #[must_use]
    pub fn segment(&self, version: i64) -> Option<InMemoryBackend> {
        self.segments
            .lock()
            .get(&version)
            .map(|segment| segment.backend.share())
    }

    /// Installs a segment with the given bytes, replacing any existing one.
    pub fn insert(&self, version: i64, data: Vec<u8>) {
        self.segments.lock().insert(
            version,
            MemorySegment {
                backend: InMemoryBackend::with_data(data),
                modified_millis: epoch_millis(SystemTime::now()),
            },
        );
    }

    /// Overrides the modification time reported for a segment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SegmentNotFound`] if the segment does not
    /// exist.
    pub fn set_modified_millis(&self, version: i64, millis: i64) -> StorageResult<()> {
        let mut segments = self.segments.lock();
        let segment = segments
            .get_mut(&version)
            .ok_or(StorageError::SegmentNotFound { version })?;
        segment.modified_millis = millis;
        Ok(())
    }
}

impl SegmentStore for InMemorySegmentStore {
    fn open_writer(&self, version: i64) -> StorageResult<Box<dyn StorageBackend>> {
        let mut segments = self.segments.lock();
        let segment = segments.entry(version).or_insert_with(|| MemorySegment {
            backend: InMemoryBackend::new(),
            modified_millis: epoch_millis(SystemTime::now()),
        });
        Ok(Box::new(segment.backend.share()))
    }

    fn open_reader(&self, version: i64) -> StorageResult<Option<Box<dyn StorageBackend>>> {
        Ok(self.segments.lock().get(&version).map(|segment| {
            Box::new(segment.backend.share_read_only()) as Box<dyn StorageBackend>
        }))
    }

    fn versions(&self) -> StorageResult<Vec<i64>> {
        Ok(self.segments.lock().keys().copied().collect())
    }

    fn remove(&self, version: i64) -> StorageResult<()> {
        self.segments
            .lock()
            .remove(&version)
            .map(|_| ())
            .ok_or(StorageError::SegmentNotFound { version })
    }

    fn modified_millis(&self, version: i64) -> StorageResult<i64> {
        self.segments
            .lock()
            .get(&version)
            .map(|segment| segment.modified_millis)
            .ok_or(StorageError::SegmentNotFound { version })
    }
}
