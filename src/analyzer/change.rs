use crate::model::{ChangeRecord, Observation, SkipReason};
use chrono::Utc;

/// Derives the latest month-over-month change from a series sorted
/// ascending by period.
///
/// The two most recent observations are current/previous. Fewer than two
/// points or a non-numeric value in either of them is a [`SkipReason`], not
/// an error: the caller skips the product and moves on.
pub fn compute_change(series: &[Observation]) -> Result<ChangeRecord, SkipReason> {
    if series.len() < 2 {
        return Err(SkipReason::InsufficientData);
    }

    let current = &series[series.len() - 1];
    let previous = &series[series.len() - 2];

    let current_value = current.numeric_value().ok_or(SkipReason::InvalidValue)?;
    let previous_value = previous.numeric_value().ok_or(SkipReason::InvalidValue)?;

    let change = current_value - previous_value;
    // A percentage against a zero base is undefined; leave it absent rather
    // than substituting a number.
    let change_percent = if previous_value != 0.0 {
        Some(change / previous_value * 100.0)
    } else {
        None
    };

    Ok(ChangeRecord {
        product: current.product.clone(),
        region: current.region.clone(),
        current_value,
        previous_value,
        change,
        change_percent,
        current_period: current.period.clone(),
        previous_period: previous.period.clone(),
        computed_at: Utc::now(),
    })
}
