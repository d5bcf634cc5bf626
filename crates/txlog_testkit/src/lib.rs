//! # txlog testkit
//!
//! Test utilities for the txlog transaction log.
//!
//! This crate provides:
//! - Test fixtures and log helpers
//! - Property-based test generators using proptest
//! - Crash simulation and corruption helpers
//!
//! ## Usage
//!
//! ```rust
//! use txlog_testkit::prelude::*;
//! use txlog_core::LogPosition;
//!
//! with_temp_log(|log| {
//!     commit_transactions(log, 1..=3);
//!     assert_eq!(committed_tx_ids(log, LogPosition::START), vec![1, 2, 3]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
