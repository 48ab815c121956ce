//! Reference maxima for "marked" dates.
//!
//! Operators can list past flood days (`MARKED_VALUE_BY_DATE=2020-10-28,2022-10-15`)
//! whose daily peak flows are drawn as horizontal reference lines on the
//! hourly chart. Past days never change, so each day is fetched once and
//! remembered in `marked_dates.json` inside the cache directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::series::{safe_float, DEFAULT_READING};
use crate::ingest::discharge::day_window;
use crate::ingest::DischargeSource;
use crate::logging::DataSource;
use crate::model::{HydroError, FIELD_FLOW_THU_BON, FIELD_FLOW_VU_GIA};

const LOG: &str = DataSource::Cache.target();

/// File name of the maxima cache inside the cache directory.
pub const MARKED_CACHE_FILE: &str = "marked_dates.json";

/// Daily peak `(Vu Gia, Thu Bồn)` flow per `YYYY-MM-DD`.
pub type MarkedMaxima = BTreeMap<String, (f64, f64)>;

/// Parses a comma-separated date list, ignoring blanks.
pub fn parse_marked_dates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MARKED_CACHE_FILE)
}

/// Loads remembered maxima; a missing or unreadable file is an empty cache.
pub fn load_marked_cache(cache_dir: &Path) -> MarkedMaxima {
    let path = cache_path(cache_dir);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return MarkedMaxima::new();
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(target: LOG, "Ignoring unreadable {}: {}", path.display(), e);
        MarkedMaxima::new()
    })
}

pub fn save_marked_cache(cache_dir: &Path, maxima: &MarkedMaxima) -> Result<(), HydroError> {
    std::fs::create_dir_all(cache_dir).map_err(|e| HydroError::io(cache_dir, e))?;
    let path = cache_path(cache_dir);
    let json = serde_json::to_string_pretty(maxima).map_err(|e| HydroError::CacheCorruption {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    std::fs::write(&path, json).map_err(|e| HydroError::io(&path, e))
}

/// Returns maxima for every remembered date, fetching the listed dates that
/// are not remembered yet.
///
/// A day with no records is remembered as `(0, 0)`; a day whose fetch fails
/// is logged and retried on the next run.
pub fn fetch_marked_date_maxima(
    dates: &[String],
    plant_ids: &str,
    source: &dyn DischargeSource,
    cache_dir: &Path,
) -> MarkedMaxima {
    let mut maxima = load_marked_cache(cache_dir);
    let mut updated = false;

    for date in dates {
        if maxima.contains_key(date) {
            continue;
        }

        info!(target: LOG, "Fetching marked date {} from API...", date);
        let records = match source.fetch(&day_window(date, plant_ids)) {
            Ok(records) => records,
            Err(e) => {
                warn!(target: LOG, "Failed to fetch {}: {}", date, e);
                continue;
            }
        };

        let peak = records.iter().fold((0.0_f64, 0.0_f64), |(vu, thu), record| {
            (
                vu.max(safe_float(record.get(FIELD_FLOW_VU_GIA), DEFAULT_READING)),
                thu.max(safe_float(record.get(FIELD_FLOW_THU_BON), DEFAULT_READING)),
            )
        });
        maxima.insert(date.clone(), peak);
        updated = true;
    }

    if updated {
        if let Err(e) = save_marked_cache(cache_dir, &maxima) {
            warn!(target: LOG, "Could not save marked date cache: {}", e);
        }
    }

    maxima
}
