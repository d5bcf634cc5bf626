//! Retention policy configuration values.

use super::{
    AgeBasedPruning, KeepAll, PruningStrategy, SegmentCountPruning, SizeBasedPruning,
    TransactionCountPruning,
};
use crate::clock::Clock;
use crate::error::LogError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How much log to keep once it is no longer needed for recovery.
///
/// Parsed from the forms `true`/`keep_all`, `false`, `<n> files`,
/// `<n>[k|M|G] size`, `<n>[k|M|G] txs` and `<n> hours`/`<n> days`.
///
/// ```
/// use txlog_core::RetentionPolicy;
///
/// let policy: RetentionPolicy = "100M size".parse().unwrap();
/// assert_eq!(policy, RetentionPolicy::Size(100 * 1024 * 1024));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Never prune.
    KeepAll,
    /// Keep the newest `n` segments.
    Files(u64),
    /// Keep at least this many bytes.
    Size(u64),
    /// Keep at least this many transactions.
    Transactions(u64),
    /// Keep segments modified within this age.
    Age(Duration),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Files(7)
    }
}

impl RetentionPolicy {
    /// Builds the strategy for this policy.
    #[must_use]
    pub fn build(&self, clock: Arc<dyn Clock>) -> Box<dyn PruningStrategy> {
        match *self {
            Self::KeepAll => Box::new(KeepAll),
            Self::Files(n) => Box::new(SegmentCountPruning::new(n)),
            Self::Size(bytes) => Box::new(SizeBasedPruning::new(bytes)),
            Self::Transactions(n) => Box::new(TransactionCountPruning::new(n)),
            Self::Age(age) => Box::new(AgeBasedPruning::new(age, clock)),
        }
    }
}

fn parse_scaled(number: &str) -> Option<u64> {
    let (digits, scale) = match number.chars().last()? {
        'k' | 'K' => (&number[..number.len() - 1], 1024),
        'm' | 'M' => (&number[..number.len() - 1], 1024 * 1024),
        'g' | 'G' => (&number[..number.len() - 1], 1024 * 1024 * 1024),
        _ => (number, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(scale)
}

impl FromStr for RetentionPolicy {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LogError::invalid_argument(format!("invalid log retention '{s}'"));
        let value = s.trim();
        match value {
            "true" | "keep_all" => return Ok(Self::KeepAll),
            "false" => return Ok(Self::Files(1)),
            _ => {}
        }

        let mut parts = value.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        match unit {
            "files" => amount.parse().map(Self::Files).map_err(|_| invalid()),
            "size" => parse_scaled(amount).map(Self::Size).ok_or_else(invalid),
            "txs" => parse_scaled(amount).map(Self::Transactions).ok_or_else(invalid),
            "hours" | "days" => {
                let n: u64 = amount.parse().map_err(|_| invalid())?;
                let unit_secs = if unit == "hours" { 3_600 } else { 86_400 };
                n.checked_mul(unit_secs)
                    .map(|secs| Self::Age(Duration::from_secs(secs)))
                    .ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepAll => write!(f, "keep_all"),
            Self::Files(n) => write!(f, "{n} files"),
            Self::Size(bytes) => write!(f, "{bytes} size"),
            Self::Transactions(n) => write!(f, "{n} txs"),
            Self::Age(age) if age.as_secs() % 86_400 == 0 => {
                write!(f, "{} days", age.as_secs() / 86_400)
            }
            Self::Age(age) => write!(f, "{} hours", age.as_secs() / 3_600),
        }
    }
}
