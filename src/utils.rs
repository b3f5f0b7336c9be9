// Utility functions for YYYY-MM reference periods.

/// Splits a `YYYY-MM` period into (year, month). Returns `None` for
/// anything that is not a well-formed period.
pub fn split_period(period: &str) -> Option<(i32, u32)> {
    let (year, month) = period.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

pub fn format_period(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// The period exactly 12 calendar months before `period`: the same month of
/// the previous year. `None` if `period` is malformed.
pub fn year_ago_period(period: &str) -> Option<String> {
    let (year, month) = split_period(period)?;
    Some(format_period(year - 1, month))
}
