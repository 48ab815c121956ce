/// Station registry for the Quảng Nam / Đà Nẵng river monitoring service.
///
/// Defines the water-level gauge stations this service knows how to chart,
/// with their alert levels, and the discharge series reported by the
/// hydropower API. All other modules should reference stations and series
/// labels from here rather than hardcoding them.

use crate::model::{ThresholdRule, FIELD_FLOW_THU_BON, FIELD_FLOW_VU_GIA};

// ---------------------------------------------------------------------------
// Discharge series
// ---------------------------------------------------------------------------

/// Plant ids requested when none are given on the command line.
pub const DEFAULT_PLANT_IDS: &str = "1,2,3,4";

/// A discharge field of the hydropower API and its display label.
pub struct DischargeSeries {
    pub field: &'static str,
    pub label: &'static str,
}

/// The two downstream flows charted from the hydropower report, in the order
/// they appear in extracted `Series::values`.
pub static DISCHARGE_SERIES: &[DischargeSeries] = &[
    DischargeSeries {
        field: FIELD_FLOW_VU_GIA,
        label: "Q về Vu Gia",
    },
    DischargeSeries {
        field: FIELD_FLOW_THU_BON,
        label: "Q về Thu Bồn",
    },
];

/// Field names of `DISCHARGE_SERIES`, suitable for `SeriesSpec::fields`.
pub fn discharge_fields() -> Vec<&'static str> {
    DISCHARGE_SERIES.iter().map(|s| s.field).collect()
}

/// Normalizes a comma-separated plant id list such as `"1, 2,3"` into the
/// compact form sent to the API (`"1,2,3"`).
///
/// Whitespace around each id is dropped; an empty list or an empty id is an
/// error.
pub fn normalize_plant_ids(ids: &str) -> Result<String, String> {
    if ids.trim().is_empty() {
        return Err("plant id list is empty".to_string());
    }
    let mut normalized = Vec::new();
    for id in ids.split(',').map(str::trim) {
        if id.is_empty() {
            return Err(format!("empty plant id in '{}'", ids));
        }
        normalized.push(id);
    }
    Ok(normalized.join(","))
}

// ---------------------------------------------------------------------------
// Water-level stations
// ---------------------------------------------------------------------------

/// Metadata for a water-level gauge published in the shared sheet.
pub struct Station {
    /// Station code as it appears in the `ma_tram` column.
    pub code: &'static str,
    pub name: &'static str,
    /// Alert levels in ascending order of severity.
    pub thresholds: &'static [ThresholdRule],
}

impl Station {
    /// The highest-severity rule, used for rising-edge alerts.
    pub fn top_threshold(&self) -> Option<&'static ThresholdRule> {
        self.thresholds.last()
    }
}

/// Alert levels BĐ1–BĐ3 for the Ái Nghĩa gauge on the Vu Gia river.
pub static AI_NGHIA_THRESHOLDS: &[ThresholdRule] = &[
    ThresholdRule { label: "BĐ1", level: 6.5 },
    ThresholdRule { label: "BĐ2", level: 8.0 },
    ThresholdRule { label: "BĐ3", level: 9.0 },
];

/// Station charted when `--ma-tram` is not given.
pub const DEFAULT_STATION_CODE: &str = "553300";

pub static STATION_REGISTRY: &[Station] = &[Station {
    code: "553300",
    name: "Ái Nghĩa",
    thresholds: AI_NGHIA_THRESHOLDS,
}];

/// Looks up a station by code. Returns `None` if not found.
pub fn find_station(code: &str) -> Option<&'static Station> {
    STATION_REGISTRY.iter().find(|s| s.code == code)
}

/// The registered station for `code`, or Ái Nghĩa for codes the registry
/// does not know.
pub fn station_or_default(code: &str) -> &'static Station {
    find_station(code).unwrap_or(&STATION_REGISTRY[0])
}

/// Threshold rules for a station code, falling back to the Ái Nghĩa levels.
pub fn thresholds_for(code: &str) -> &'static [ThresholdRule] {
    station_or_default(code).thresholds
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_ordered_ascending() {
        // Rising-edge alerts compare against the last rule; an unordered list
        // would alert on the wrong level.
        for station in STATION_REGISTRY {
            for pair in station.thresholds.windows(2) {
                assert!(
                    pair[0].level < pair[1].level,
                    "{} must be below {} for station '{}'",
                    pair[0].label,
                    pair[1].label,
                    station.name
                );
            }
        }
    }

    #[test]
    fn test_top_threshold_is_bd3_for_ai_nghia() {
        let station = find_station("553300").expect("Ái Nghĩa should be in registry");
        let top = station.top_threshold().expect("station has thresholds");
        assert_eq!(top.label, "BĐ3");
        assert_eq!(top.level, 9.0);
    }

    #[test]
    fn test_unknown_station_falls_back_to_default_levels() {
        assert!(find_station("000000").is_none());
        assert_eq!(thresholds_for("000000").len(), 3);
        let top = station_or_default("000000").top_threshold().map(|r| r.level);
        assert_eq!(top, Some(9.0), "unknown codes alert on the Ái Nghĩa BĐ3 level");
    }

    #[test]
    fn test_no_duplicate_station_codes() {
        let mut seen = std::collections::HashSet::new();
        for station in STATION_REGISTRY {
            assert!(seen.insert(station.code), "duplicate code '{}'", station.code);
        }
    }

    #[test]
    fn test_discharge_fields_are_in_series_order() {
        assert_eq!(discharge_fields(), vec!["qvevugia", "qvethubon"]);
    }

    #[test]
    fn test_normalize_plant_ids() {
        assert_eq!(normalize_plant_ids(DEFAULT_PLANT_IDS).as_deref(), Ok("1,2,3,4"));
        assert_eq!(normalize_plant_ids("7").as_deref(), Ok("7"));
        assert_eq!(normalize_plant_ids(" 1, 2 ,3").as_deref(), Ok("1,2,3"));
        assert_eq!(normalize_plant_ids("a1,b2").as_deref(), Ok("a1,b2"));
        assert!(normalize_plant_ids("").is_err());
        assert!(normalize_plant_ids("  ").is_err());
        assert!(normalize_plant_ids("1,,2").is_err());
        assert!(normalize_plant_ids("1, ,2").is_err());
    }
}
