//! `pricewatch` library crate.
//!
//! Derives analytic records from monthly price observations keyed by
//! (product, region): the latest month-over-month change, the active
//! consecutive-change streak, and a year-over-year comparison. The binary
//! is a thin wrapper so the engine stays testable without a database on
//! disk.

pub mod analyzer;
pub mod config;
pub mod model;
pub mod recompute;
pub mod storage;
pub mod utils;
