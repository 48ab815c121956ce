//! Record → time series extraction.
//!
//! The two feeds need different cleaning rules, so each rule is a named
//! policy that a `SeriesSpec` combines:
//!
//! | feed        | duplicates        | invalid values   | all-zero rows |
//! |-------------|-------------------|------------------|---------------|
//! | discharge   | last write wins   | default to 0.0   | dropped       |
//! | water level | last write wins   | row skipped      | kept          |

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use log::warn;
use serde_json::Value;

use crate::logging::DataSource;
use crate::model::{
    HydroError, Record, Series, FIELD_LEVEL, FIELD_OBSERVED_AT, FIELD_RELEASE_TIME, FIELD_STATION,
};
use crate::stations::discharge_fields;

const LOG: &str = DataSource::System.target();

/// Value substituted for missing or unparseable discharge readings.
pub const DEFAULT_READING: f64 = 0.0;

// ---------------------------------------------------------------------------
// Numeric parsing
// ---------------------------------------------------------------------------

/// Reads a numeric field without failing.
///
/// Missing fields, JSON null, empty strings, non-numeric text and non-finite
/// numbers all yield `None`.
pub fn parse_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// `parse_number` with a fallback.
pub fn safe_float(value: Option<&Value>, default: f64) -> f64 {
    parse_number(value).unwrap_or(default)
}

/// Parses the timestamp formats seen in both feeds.
///
/// Offsets are dropped after conversion to the wall-clock time at that
/// offset, so every series is plotted in the time zone the upstream used.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What to do with a row whose numeric fields are all exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroRows {
    Keep,
    /// The discharge portal reports 0/0 for hours it has no data for.
    DropAllZero,
}

impl ZeroRows {
    pub fn admits(self, values: &[f64]) -> bool {
        match self {
            ZeroRows::Keep => true,
            ZeroRows::DropAllZero => !values.iter().all(|v| *v == 0.0),
        }
    }
}

/// What to do with a missing, empty or non-numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidValues {
    UseDefault(f64),
    SkipRow,
}

impl InvalidValues {
    /// Parses every field of `record`; `None` means the row is dropped.
    pub fn read(self, record: &Record, fields: &[&str]) -> Option<Vec<f64>> {
        fields
            .iter()
            .map(|field| {
                let parsed = parse_number(record.get(*field));
                match self {
                    InvalidValues::UseDefault(default) => Some(parsed.unwrap_or(default)),
                    InvalidValues::SkipRow => parsed,
                }
            })
            .collect()
    }
}

/// The trimmed, non-blank timestamp string of a record.
pub fn timestamp_key(record: &Record, timestamp_field: &str) -> Option<String> {
    match record.get(timestamp_field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Collapses rows sharing a timestamp key, keeping the last one seen.
///
/// The returned map is ordered by key, which is chronological for
/// ISO-8601 timestamps.
pub fn last_write_wins<T, I>(rows: I) -> BTreeMap<String, T>
where
    I: IntoIterator<Item = (String, T)>,
{
    let mut latest_by_time = BTreeMap::new();
    for (key, row) in rows {
        latest_by_time.insert(key, row);
    }
    latest_by_time
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Which fields to read from each record and how to clean them.
#[derive(Debug, Clone)]
pub struct SeriesSpec<'a> {
    pub timestamp_field: &'a str,
    pub fields: Vec<&'a str>,
    pub invalid: InvalidValues,
    pub zero_rows: ZeroRows,
    /// Keep only records where `field == value`, e.g. one gauge station.
    pub only: Option<(&'a str, &'a str)>,
}

impl<'a> SeriesSpec<'a> {
    /// Discharge feed: both river flows, missing values as 0.0, no-signal
    /// rows dropped.
    pub fn discharge() -> Self {
        SeriesSpec {
            timestamp_field: FIELD_RELEASE_TIME,
            fields: discharge_fields(),
            invalid: InvalidValues::UseDefault(DEFAULT_READING),
            zero_rows: ZeroRows::DropAllZero,
            only: None,
        }
    }

    /// Water-level feed for one station: unreadable rows skipped, zeros kept.
    pub fn water_level(station: &'a str) -> Self {
        SeriesSpec {
            timestamp_field: FIELD_OBSERVED_AT,
            fields: vec![FIELD_LEVEL],
            invalid: InvalidValues::SkipRow,
            zero_rows: ZeroRows::Keep,
            only: Some((FIELD_STATION, station)),
        }
    }

    fn selects(&self, record: &Record) -> bool {
        match self.only {
            None => true,
            Some((field, wanted)) => match record.get(field) {
                Some(Value::String(s)) => s.trim() == wanted,
                Some(Value::Number(n)) => n.to_string() == wanted,
                _ => false,
            },
        }
    }

    /// Turns records into a time-ordered series.
    ///
    /// Cleaning happens before de-duplication, so a rejected row never
    /// shadows an earlier valid row at the same timestamp.
    pub fn extract(&self, records: &[Record]) -> Series {
        let cleaned = records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.selects(record))
            .filter_map(|(arrival, record)| {
                let key = timestamp_key(record, self.timestamp_field)?;
                let values = self.invalid.read(record, &self.fields)?;
                self.zero_rows.admits(&values).then_some((key, (arrival, values)))
            });

        // Different spellings of one instant survive the key dedup; among
        // them the row that arrived last wins.
        let mut by_time: BTreeMap<NaiveDateTime, (usize, Vec<f64>)> = BTreeMap::new();
        for (key, (arrival, values)) in last_write_wins(cleaned) {
            let Some(time) = parse_timestamp(&key) else {
                warn!(target: LOG, "Skipping row with unparseable timestamp '{}'", key);
                continue;
            };
            let newer = by_time.get(&time).is_none_or(|(kept, _)| *kept < arrival);
            if newer {
                by_time.insert(time, (arrival, values));
            }
        }

        let mut series = Series {
            timeline: Vec::with_capacity(by_time.len()),
            values: vec![Vec::with_capacity(by_time.len()); self.fields.len()],
        };
        for (time, (_, values)) in by_time {
            series.timeline.push(time);
            for (column, value) in series.values.iter_mut().zip(values) {
                column.push(value);
            }
        }
        series
    }
}

/// Timeline plus the Vu Gia and Thu Bồn flows of a discharge report.
pub fn extract_discharge(records: &[Record]) -> Series {
    SeriesSpec::discharge().extract(records)
}

/// Level readings for one station of the water-level sheet.
///
/// Fails with `NoData` when the station has no valid rows.
pub fn water_level_series(records: &[Record], station: &str) -> Result<Series, HydroError> {
    let series = SeriesSpec::water_level(station).extract(records);
    if series.is_empty() {
        return Err(HydroError::NoData(format!(
            "no valid data points found for station {}",
            station
        )));
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("test record must be an object, got {}", other),
        }
    }

    fn discharge(time: &str, vu: Value, thu: Value) -> Record {
        record(json!({ "thoigianxa": time, "qvevugia": vu, "qvethubon": thu }))
    }

    fn level(station: &str, time: &str, value: &str) -> Record {
        record(json!({ "ma_tram": station, "thoi_gian": time, "so_lieu": value }))
    }

    // --- safe_float -----------------------------------------------------------

    #[test]
    fn test_malformed_numbers_resolve_to_default() {
        assert_eq!(safe_float(None, 0.0), 0.0);
        assert_eq!(safe_float(Some(&Value::Null), 0.0), 0.0);
        assert_eq!(safe_float(Some(&json!("")), 0.0), 0.0);
        assert_eq!(safe_float(Some(&json!("n/a")), 7.5), 7.5);
        assert_eq!(safe_float(Some(&json!(true)), 1.0), 1.0);
        assert_eq!(safe_float(Some(&json!("NaN")), 2.0), 2.0);
    }

    #[test]
    fn test_numbers_and_numeric_strings_parse() {
        assert_eq!(safe_float(Some(&json!(812.5)), 0.0), 812.5);
        assert_eq!(safe_float(Some(&json!(" 1200 ")), 0.0), 1200.0);
        assert_eq!(safe_float(Some(&json!(-3)), 0.0), -3.0);
    }

    // --- timestamps -----------------------------------------------------------

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDateTime::parse_from_str("2024-10-28 14:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        for raw in [
            "2024-10-28T14:00:00",
            "2024-10-28T14:00:00.000",
            "2024-10-28 14:00:00",
            "2024-10-28T14:00",
            "2024-10-28T14:00:00+07:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "format {}", raw);
        }
        assert_eq!(parse_timestamp("28/10/2024"), None);
    }

    // --- discharge ------------------------------------------------------------

    #[test]
    fn test_duplicate_timestamps_keep_last_record() {
        let records = vec![
            discharge("2024-10-28T14:00:00", json!(100), json!(200)),
            discharge("2024-10-28T13:00:00", json!(50), json!(60)),
            discharge("2024-10-28T14:00:00", json!(110), json!(210)),
        ];
        let series = extract_discharge(&records);
        assert_eq!(series.len(), 2);
        assert_eq!(series.field(0), &[50.0, 110.0]);
        assert_eq!(series.field(1), &[60.0, 210.0]);
    }

    #[test]
    fn test_timeline_is_strictly_increasing_for_shuffled_input() {
        let records = vec![
            discharge("2024-10-29T01:00:00", json!(4), json!(4)),
            discharge("2024-10-28T23:00:00", json!(2), json!(2)),
            discharge("2024-10-29T00:00:00", json!(3), json!(3)),
            discharge("2024-10-28T23:00:00", json!(1), json!(1)),
            discharge("2024-10-29T01:00:00", json!(5), json!(5)),
        ];
        let series = extract_discharge(&records);
        assert!(series.timeline.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(series.field(0), &[1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_all_zero_rows_are_dropped_for_discharge() {
        let records = vec![
            discharge("2024-10-28T13:00:00", json!(0), json!(0)),
            discharge("2024-10-28T14:00:00", json!(0), json!(15)),
            discharge("2024-10-28T15:00:00", json!(null), json!("")),
        ];
        let series = extract_discharge(&records);
        assert_eq!(series.len(), 1, "0/0 and null/empty rows carry no signal");
        assert_eq!(series.field(0), &[0.0]);
        assert_eq!(series.field(1), &[15.0]);
    }

    #[test]
    fn test_malformed_fields_in_a_record_use_default() {
        let records = vec![discharge("2024-10-28T14:00:00", json!("abc"), json!(900))];
        let series = extract_discharge(&records);
        assert_eq!(series.field(0), &[DEFAULT_READING]);
        assert_eq!(series.field(1), &[900.0]);
    }

    #[test]
    fn test_records_without_timestamp_are_skipped() {
        let records = vec![
            record(json!({ "qvevugia": 10, "qvethubon": 10 })),
            discharge("", json!(10), json!(10)),
            discharge("2024-10-28T14:00:00", json!(10), json!(10)),
        ];
        assert_eq!(extract_discharge(&records).len(), 1);
    }

    #[test]
    fn test_empty_input_gives_empty_series() {
        let series = extract_discharge(&[]);
        assert!(series.timeline.is_empty());
        assert_eq!(series.values, vec![Vec::<f64>::new(), Vec::new()]);
    }

    #[test]
    fn test_equivalent_spellings_of_one_instant_collapse() {
        let records = vec![
            discharge("2024-10-28T14:00:00", json!(1), json!(1)),
            discharge("2024-10-28 14:00:00", json!(2), json!(2)),
        ];
        let series = extract_discharge(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series.values[0], vec![2.0], "the later row wins");

        // Same instant, spellings swapped: arrival order still decides.
        let records = vec![
            discharge("2024-10-28 14:00:00", json!(1), json!(1)),
            discharge("2024-10-28T14:00:00", json!(2), json!(2)),
        ];
        let series = extract_discharge(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series.values[0], vec![2.0], "the later row wins whatever its spelling");
        assert_eq!(series.values[1], vec![2.0]);
    }

    // --- policies -------------------------------------------------------------

    #[test]
    fn test_zero_row_policy() {
        assert!(ZeroRows::Keep.admits(&[0.0, 0.0]));
        assert!(!ZeroRows::DropAllZero.admits(&[0.0, 0.0]));
        assert!(ZeroRows::DropAllZero.admits(&[0.0, 0.1]));
    }

    #[test]
    fn test_invalid_value_policy() {
        let r = level("553300", "2024-10-28 14:00:00", "");
        assert_eq!(InvalidValues::SkipRow.read(&r, &["so_lieu"]), None);
        assert_eq!(InvalidValues::UseDefault(0.0).read(&r, &["so_lieu"]), Some(vec![0.0]));
    }

    #[test]
    fn test_last_write_wins_orders_keys_and_keeps_latest() {
        let rows = vec![
            ("2024-10-28T14:00:00".to_string(), 'a'),
            ("2024-10-28T13:00:00".to_string(), 'b'),
            ("2024-10-28T14:00:00".to_string(), 'c'),
        ];
        let winners: Vec<_> = last_write_wins(rows).into_iter().collect();
        assert_eq!(
            winners,
            vec![
                ("2024-10-28T13:00:00".to_string(), 'b'),
                ("2024-10-28T14:00:00".to_string(), 'c'),
            ]
        );
    }

    #[test]
    fn test_timestamp_key_trims_and_rejects_blank() {
        let r = discharge(" 2024-10-28T14:00:00 ", json!(1), json!(1));
        assert_eq!(timestamp_key(&r, "thoigianxa").as_deref(), Some("2024-10-28T14:00:00"));
        assert_eq!(timestamp_key(&discharge("  ", json!(1), json!(1)), "thoigianxa"), None);
        assert_eq!(timestamp_key(&r, "missing"), None);
    }

    // --- water level ----------------------------------------------------------

    #[test]
    fn test_water_level_filters_station_and_skips_invalid() {
        let records = vec![
            level("553300", "2024-10-28 14:00:00", "9.21"),
            level("553400", "2024-10-28 14:30:00", "3.10"),
            level("553300", "2024-10-28 13:00:00", "8.52"),
            level("553300", "2024-10-28 15:00:00", "--"),
            level("553300", "", "9.9"),
            level("553300", "2024-10-28 16:00:00", "0"),
        ];
        let series = water_level_series(&records, "553300").expect("station has rows");
        assert_eq!(series.field(0), &[8.52, 9.21, 0.0]);
    }

    #[test]
    fn test_invalid_row_does_not_shadow_earlier_valid_row() {
        let records = vec![
            level("553300", "2024-10-28 14:00:00", "9.21"),
            level("553300", "2024-10-28 14:00:00", "x"),
        ];
        let series = water_level_series(&records, "553300").unwrap();
        assert_eq!(series.field(0), &[9.21]);
    }

    #[test]
    fn test_station_without_rows_is_no_data() {
        let records = vec![level("553400", "2024-10-28 14:00:00", "3.1")];
        match water_level_series(&records, "553300") {
            Err(HydroError::NoData(msg)) => assert!(msg.contains("553300")),
            other => panic!("expected NoData, got {:?}", other),
        }
    }
}
