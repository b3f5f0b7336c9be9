use crate::model::{ChangeRecord, EnrichedChange, Observation, YearAgo};

/// Enriches a change record with the comparison against the observation 12
/// calendar months before its current period.
///
/// The caller resolves the target period (see
/// [`crate::utils::year_ago_period`]) through its point-lookup and hands
/// over whatever it found. A missing observation
/// or a non-numeric value yields no `YearAgo` at all — "no comparison
/// available" must never read as "no change".
pub fn enrich_yoy(change: ChangeRecord, year_ago_obs: Option<&Observation>) -> EnrichedChange {
    let year_ago = year_ago_obs
        .and_then(|obs| obs.numeric_value())
        .map(|value| {
            let diff = change.current_value - value;
            YearAgo {
                value,
                change: diff,
                percent: if value != 0.0 {
                    Some(diff / value * 100.0)
                } else {
                    None
                },
            }
        });

    EnrichedChange { change, year_ago }
}
