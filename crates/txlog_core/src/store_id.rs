//! Store identity.

use crate::error::{LogError, LogResult};
use rand::Rng;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Engine and store-version name carried by identities decoded from
/// checkpoint entries, which only record creation time and random id.
pub const LEGACY_NAME: &str = "legacy";

/// Identity of the store a log belongs to.
///
/// Created once when a store is created and never changed afterwards.
/// Every checkpoint records it so a log cannot be replayed into a
/// different store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreId {
    creation_time: i64,
    random_id: i64,
    store_version: String,
    engine: String,
    major_version: i32,
    minor_version: i32,
}

impl StoreId {
    /// Creates a store identity from its parts.
    #[must_use]
    pub fn new(
        creation_time: i64,
        random_id: i64,
        engine: impl Into<String>,
        store_version: impl Into<String>,
        major_version: i32,
        minor_version: i32,
    ) -> Self {
        Self {
            creation_time,
            random_id,
            store_version: store_version.into(),
            engine: engine.into(),
            major_version,
            minor_version,
        }
    }

    /// Creates a fresh identity for a new store.
    #[must_use]
    pub fn generate(
        engine: impl Into<String>,
        store_version: impl Into<String>,
        major_version: i32,
        minor_version: i32,
    ) -> Self {
        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let random_id = rand::thread_rng().gen::<i64>();
        Self::new(
            creation_time,
            random_id,
            engine,
            store_version,
            major_version,
            minor_version,
        )
    }

    /// Creates the identity recovered from a checkpoint entry.
    #[must_use]
    pub fn legacy(creation_time: i64, random_id: i64) -> Self {
        Self::new(creation_time, random_id, LEGACY_NAME, LEGACY_NAME, 1, 1)
    }

    /// Returns the store creation time in epoch millis.
    #[must_use]
    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    /// Returns the random component.
    #[must_use]
    pub fn random_id(&self) -> i64 {
        self.random_id
    }

    /// Returns the store format name.
    #[must_use]
    pub fn store_version(&self) -> &str {
        &self.store_version
    }

    /// Returns the storage engine name.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Returns the store format major version.
    #[must_use]
    pub fn major_version(&self) -> i32 {
        self.major_version
    }

    /// Returns the store format minor version.
    #[must_use]
    pub fn minor_version(&self) -> i32 {
        self.minor_version
    }

    /// Returns true if this identity was recovered from a checkpoint entry.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.engine == LEGACY_NAME && self.store_version == LEGACY_NAME
    }

    /// Returns true if both identities name the same store.
    ///
    /// All fields must match, except that a legacy identity only carries
    /// creation time and random id, so only those are compared when
    /// either side is legacy.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        if self.is_legacy() || other.is_legacy() {
            return self.creation_time == other.creation_time && self.random_id == other.random_id;
        }
        self == other
    }

    /// Checks that `found` names this store.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::IncompatibleStoreId`] if it does not.
    pub fn assert_compatible(&self, found: &Self) -> LogResult<()> {
        if self.is_compatible_with(found) {
            Ok(())
        } else {
            Err(LogError::IncompatibleStoreId {
                expected: Box::new(self.clone()),
                found: Box::new(found.clone()),
            })
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreId{{{}-{}-{}.{}-{:#x}-{:#x}}}",
            self.engine,
            self.store_version,
            self.major_version,
            self.minor_version,
            self.creation_time,
            self.random_id
        )
    }
}

/// Supplies the identity of the running store.
pub trait StoreIdProvider: Send + Sync {
    /// Returns the current store identity.
    fn store_id(&self) -> StoreId;
}

impl StoreIdProvider for StoreId {
    fn store_id(&self) -> StoreId {
        self.clone()
    }
}
