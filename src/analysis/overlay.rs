//! Day-over-day overlay buckets.
//!
//! Every point is moved onto the same reference date so that several days
//! can share one hour-of-day x-axis.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

/// Date all normalized times are placed on (2000-01-01). Only the time of
/// day matters.
pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

/// One calendar day of a series, remapped onto `reference_date()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayBucket {
    pub times: Vec<NaiveDateTime>,
    /// One vector per input series, parallel to `times`.
    pub values: Vec<Vec<f64>>,
}

impl OverlayBucket {
    pub fn series(&self, index: usize) -> &[f64] {
        self.values.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Buckets keyed by `YYYY-MM-DD`, in date order.
pub type OverlayBuckets = BTreeMap<String, OverlayBucket>;

/// The point's time of day on the reference date.
pub fn normalize_time(ts: NaiveDateTime) -> NaiveDateTime {
    reference_date().and_time(ts.time())
}

/// Groups a timeline and its parallel value series by calendar day.
///
/// Points beyond the shortest input are ignored. Each bucket is sorted by
/// normalized time; the sort is stable, so equal times keep input order.
pub fn bucketize(timeline: &[NaiveDateTime], series: &[&[f64]]) -> OverlayBuckets {
    let mut grouped: BTreeMap<String, Vec<(NaiveDateTime, Vec<f64>)>> = BTreeMap::new();

    for (i, ts) in timeline.iter().enumerate() {
        let Some(point) = series.iter().map(|s| s.get(i).copied()).collect::<Option<Vec<f64>>>()
        else {
            break;
        };
        let label = ts.format("%Y-%m-%d").to_string();
        grouped.entry(label).or_default().push((normalize_time(*ts), point));
    }

    grouped
        .into_iter()
        .map(|(label, mut pairs)| {
            pairs.sort_by_key(|(time, _)| *time);
            let mut bucket = OverlayBucket {
                times: Vec::with_capacity(pairs.len()),
                values: vec![Vec::with_capacity(pairs.len()); series.len()],
            };
            for (time, point) in pairs {
                bucket.times.push(time);
                for (column, value) in bucket.values.iter_mut().zip(point) {
                    column.push(value);
                }
            }
            (label, bucket)
        })
        .collect()
}
