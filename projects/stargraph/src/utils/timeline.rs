use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};

/// Stars received per calendar day (UTC).
pub type DailyStarCounts = BTreeMap<NaiveDate, u64>;

/// A single point of the cumulative star curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPoint {
    pub date: NaiveDate,
    /// Total stars at the end of `date`.
    pub total: u64,
}

/// Buckets Unix-epoch-second timestamps by UTC day. Timestamps outside
/// chrono's representable range are skipped.
pub fn daily_star_counts(timestamps: &[i64]) -> DailyStarCounts {
    let mut counts = DailyStarCounts::new();
    for day in timestamps
        .iter()
        .filter_map(|&secs| DateTime::from_timestamp(secs, 0))
        .map(|moment| moment.date_naive())
    {
        *counts.entry(day).or_insert(0) += 1;
    }
    counts
}

/// Running star total, one point per day from the first star to the last,
/// with quiet days carrying the previous total.
pub fn cumulative_series(daily: &DailyStarCounts) -> Vec<DataPoint> {
    let (Some((&first, _)), Some((&last, _))) = (daily.first_key_value(), daily.last_key_value())
    else {
        return Vec::new();
    };

    let mut points = Vec::new();
    let mut total = 0_u64;
    for date in first.iter_days().take_while(|date| *date <= last) {
        total += daily.get(&date).copied().unwrap_or(0);
        points.push(DataPoint { date, total });
    }
    points
}
