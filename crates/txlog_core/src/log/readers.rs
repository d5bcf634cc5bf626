//! Tracking of active log readers.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Segment versions held by active readers.
///
/// Pruning takes the registry lock while it deletes, so a reader either
/// registers before pruning looks and is respected, or after pruning has
/// finished and finds its segment gone.
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    next_id: AtomicU64,
    readers: Mutex<HashMap<u64, i64>>,
}

impl ReaderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reader positioned in segment `version`.
    #[must_use]
    pub fn register(self: &Arc<Self>, version: i64) -> ReaderRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.readers.lock().insert(id, version);
        ReaderRegistration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Returns the lowest segment version held by any reader.
    #[must_use]
    pub fn min_version(&self) -> Option<i64> {
        self.readers.lock().values().copied().min()
    }

    /// Returns the number of active readers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    /// Returns true if no reader is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the registry, blocking registration and segment moves.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<u64, i64>> {
        self.readers.lock()
    }
}

/// An active reader's entry in a [`ReaderRegistry`]. Removed on drop.
#[derive(Debug)]
pub struct ReaderRegistration {
    registry: Arc<ReaderRegistry>,
    id: u64,
}

impl ReaderRegistration {
    /// Returns the reader id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records that the reader moved on to segment `version`.
    pub fn advance_to(&self, version: i64) {
        if let Some(held) = self.registry.readers.lock().get_mut(&self.id) {
            *held = version;
        }
    }
}

impl Drop for ReaderRegistration {
    fn drop(&mut self) {
        self.registry.readers.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_version_tracks_readers() {
        let registry = Arc::new(ReaderRegistry::new());
        assert_eq!(registry.min_version(), None);

        let a = registry.register(3);
        let b = registry.register(5);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.min_version(), Some(3));

        a.advance_to(6);
        assert_eq!(registry.min_version(), Some(5));

        drop(b);
        assert_eq!(registry.min_version(), Some(6));
        drop(a);
        assert!(registry.is_empty());
    }
}
