//! The resident segments a pruning strategy looks at.

use crate::error::{LogError, LogResult};

/// One resident log segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Segment version.
    pub version: i64,
    /// Size in bytes.
    pub size: u64,
    /// Last transaction committed in the segment, if any.
    pub last_tx_id: Option<i64>,
    /// Last modification time in epoch millis.
    pub modified_millis: i64,
}

/// A contiguous run of segments ordered by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    segments: Vec<Segment>,
}

impl Segments {
    /// Creates a segment run.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if versions are not
    /// consecutive and increasing.
    pub fn new(segments: Vec<Segment>) -> LogResult<Self> {
        for pair in segments.windows(2) {
            if pair[1].version != pair[0].version + 1 {
                return Err(LogError::invalid_argument(format!(
                    "segments must be contiguous: {} followed by {}",
                    pair[0].version, pair[1].version
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Returns the oldest segment.
    #[must_use]
    pub fn lowest(&self) -> Option<&Segment> {
        self.segments.first()
    }

    /// Returns the newest segment.
    #[must_use]
    pub fn highest(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if there are no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segments oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Returns the segments as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }
}

impl<'a> IntoIterator for &'a Segments {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
pub(crate) fn segments(specs: &[(i64, u64, Option<i64>, i64)]) -> Segments {
    Segments::new(
        specs
            .iter()
            .map(|&(version, size, last_tx_id, modified_millis)| Segment {
                version,
                size,
                last_tx_id,
                modified_millis,
            })
            .collect(),
    )
    .unwrap()
}
