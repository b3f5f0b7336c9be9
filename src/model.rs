// Core structs: Observation, ChangeRecord, StreakRecord, EnrichedChange
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One monthly price point for a (product, region) pair.
///
/// `value` is `None` when the upstream table carries a blank cell for the
/// month (suppressed or not collected). A NaN slipping through an import is
/// treated the same way; see [`Observation::numeric_value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub product: String,
    pub region: String,
    /// Reference month, `YYYY-MM`. Lexicographic order equals chronological order.
    pub period: String,
    pub value: Option<f64>,
}

impl Observation {
    /// The value, if it is actually usable as a number.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Latest month-over-month change for one (product, region).
///
/// `change_percent` is `None` when the previous value is zero; a percentage
/// against a zero base is meaningless, not zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub product: String,
    pub region: String,
    pub current_value: f64,
    pub previous_value: f64,
    pub change: f64,
    pub change_percent: Option<f64>,
    pub current_period: String,
    pub previous_period: String,
    pub computed_at: DateTime<Utc>,
}

/// Direction of a change or a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "increase" => Some(Direction::Increase),
            "decrease" => Some(Direction::Decrease),
            _ => None,
        }
    }
}

/// One point of a stored streak. Product and region live on the record, so
/// only the per-month data is kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakPoint {
    pub period: String,
    pub value: Option<f64>,
}

/// An active run of consecutive same-direction monthly changes.
///
/// Only streaks of length >= 2 exist as records; once broken they are deleted
/// from the store rather than zeroed out.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakRecord {
    pub product: String,
    pub region: String,
    /// Number of observations in the run (steps + 1), always >= 2.
    pub length: u32,
    pub direction: Direction,
    /// Contiguous run, oldest to newest.
    pub points: Vec<StreakPoint>,
    pub computed_at: DateTime<Utc>,
}

/// Year-over-year comparison against the observation 12 months earlier.
///
/// All fields exist together or not at all: a missing year-ago observation
/// produces no `YearAgo` rather than zeros, so "no comparison available" is
/// never conflated with "no change". `percent` alone may still be `None`
/// when the year-ago value is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct YearAgo {
    pub value: f64,
    pub change: f64,
    pub percent: Option<f64>,
}

/// A ChangeRecord plus its optional year-over-year enrichment. This is the
/// shape stored in (and read back from) the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedChange {
    pub change: ChangeRecord,
    pub year_ago: Option<YearAgo>,
}

/// Expected per-product reasons to skip derivation. Not errors: the batch
/// run logs them and moves on without touching stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than two observations in the series.
    InsufficientData,
    /// The latest or previous observation has no usable numeric value.
    InvalidValue,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientData => write!(f, "insufficient data"),
            SkipReason::InvalidValue => write!(f, "invalid value"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed stored record: {0}")]
    Corrupt(String),
}
