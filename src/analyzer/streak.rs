use crate::model::{Direction, Observation, StreakPoint, StreakRecord};
use chrono::Utc;

/// Detects the most recent unbroken run of same-direction monthly changes.
///
/// Walks the ascending series backward starting at the newest pair. The sign
/// of the newest difference fixes the direction; the walk extends while each
/// earlier difference has that same sign. A zero difference, a sign reversal
/// or a non-numeric value is a hard stop — a single flat month ends the run,
/// it does not pause it. Runs shorter than 2 observations are not streaks,
/// so `None` means "no active streak" and the caller should drop any stored
/// record for this key.
///
/// Single backward pass, O(n).
pub fn compute_streak(series: &[Observation]) -> Option<StreakRecord> {
    if series.len() < 2 {
        return None;
    }

    let mut direction: Option<Direction> = None;
    // Index of the oldest observation still inside the run.
    let mut start = series.len() - 1;

    for i in (1..series.len()).rev() {
        let (Some(current), Some(previous)) =
            (series[i].numeric_value(), series[i - 1].numeric_value())
        else {
            break;
        };

        let diff = current - previous;
        let step = if diff > 0.0 {
            Direction::Increase
        } else if diff < 0.0 {
            Direction::Decrease
        } else {
            break;
        };

        match direction {
            None => direction = Some(step),
            Some(d) if d == step => {}
            Some(_) => break,
        }
        start = i - 1;
    }

    // No qualifying newest step means no streak at all.
    let direction = direction?;

    let newest = &series[series.len() - 1];
    let points: Vec<StreakPoint> = series[start..]
        .iter()
        .map(|o| StreakPoint {
            period: o.period.clone(),
            value: o.value,
        })
        .collect();

    Some(StreakRecord {
        product: newest.product.clone(),
        region: newest.region.clone(),
        length: points.len() as u32,
        direction,
        points,
        computed_at: Utc::now(),
    })
}
