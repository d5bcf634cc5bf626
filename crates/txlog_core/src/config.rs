//! Transaction log configuration.

use crate::checkpoint::CheckpointPolicy;
use crate::kernel_version::KernelVersion;
use crate::pruning::RetentionPolicy;

/// Configuration for opening a transaction log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Segment size at which the appender rotates before the next entry.
    pub rotation_threshold: u64,

    /// Read-ahead buffer size of log readers.
    pub read_ahead_size: usize,

    /// Kernel version stamped on newly written entries.
    pub kernel_version: KernelVersion,

    /// Whether `flush` also syncs the segment to disk (safer but slower).
    pub sync_on_flush: bool,

    /// How much log to keep behind the last checkpoint.
    pub retention: RetentionPolicy,

    /// When to checkpoint.
    pub checkpoint_policy: CheckpointPolicy,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            rotation_threshold: 256 * 1024 * 1024, // 256 MB
            read_ahead_size: 64 * 1024,            // 64 KB
            kernel_version: KernelVersion::LATEST,
            sync_on_flush: true,
            retention: RetentionPolicy::default(),
            checkpoint_policy: CheckpointPolicy::default(),
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn rotation_threshold(mut self, size: u64) -> Self {
        self.rotation_threshold = size;
        self
    }

    /// Sets the reader buffer size.
    #[must_use]
    pub const fn read_ahead_size(mut self, size: usize) -> Self {
        self.read_ahead_size = size;
        self
    }

    /// Sets the kernel version of new entries.
    #[must_use]
    pub const fn kernel_version(mut self, version: KernelVersion) -> Self {
        self.kernel_version = version;
        self
    }

    /// Sets whether to sync on every flush.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub const fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = policy;
        self
    }

    /// Sets the checkpoint policy.
    #[must_use]
    pub const fn checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = policy;
        self
    }
}
