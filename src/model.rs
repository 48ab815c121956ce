/// Record, Series, Reading, ThresholdRule, RequestParams, HydroError
/// core data structures and error handling
///
/// Core data types for the hydrological reporting service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond small accessors, and no I/O.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Discharge API: release timestamp ("thời gian xả").
pub const FIELD_RELEASE_TIME: &str = "thoigianxa";

/// Discharge API: flow arriving at the Vu Gia river, m³/s.
pub const FIELD_FLOW_VU_GIA: &str = "qvevugia";

/// Discharge API: flow arriving at the Thu Bồn river, m³/s.
pub const FIELD_FLOW_THU_BON: &str = "qvethubon";

/// Water-level sheet: station code column.
pub const FIELD_STATION: &str = "ma_tram";

/// Water-level sheet: observation timestamp, `YYYY-MM-DD HH:MM:SS`.
pub const FIELD_OBSERVED_AT: &str = "thoi_gian";

/// Water-level sheet: observed level in metres.
pub const FIELD_LEVEL: &str = "so_lieu";

// ---------------------------------------------------------------------------
// Record and series types
// ---------------------------------------------------------------------------

/// One upstream row, field name → value.
///
/// JSON rows are kept exactly as the API returned them so they can be written
/// back to the cache unchanged. CSV rows carry every value as a JSON string.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A time-ordered series with one value vector per extracted field.
///
/// `timeline` is strictly increasing and every entry of `values` has the same
/// length as `timeline`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub timeline: Vec<NaiveDateTime>,
    pub values: Vec<Vec<f64>>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Values of the `index`-th field, or an empty slice if there is no such field.
    pub fn field(&self, index: usize) -> &[f64] {
        self.values.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Timestamp and value of the most recent point of field `index`.
    pub fn latest(&self, index: usize) -> Option<(NaiveDateTime, f64)> {
        let time = *self.timeline.last()?;
        let value = *self.field(index).last()?;
        Some((time, value))
    }
}

/// A labelled value offered to the notifier, e.g. `("Q về Vu Gia", 5120.0, Some("2024-10-28 14:00"))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub label: String,
    pub value: f64,
    pub timestamp: Option<String>,
}

impl Reading {
    pub fn new(label: impl Into<String>, value: f64, timestamp: Option<String>) -> Self {
        Self {
            label: label.into(),
            value,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// A named alert level ("báo động") for a gauge station, in metres.
///
/// Rule lists are ordered ascending by severity; the last rule is the
/// top-severity level used for rising-edge alerts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRule {
    pub label: &'static str,
    pub level: f64,
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// The three query parameters of a discharge request.
///
/// Doubles as the cache key input and as the `params` object stored in cache
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestParams {
    pub start: String,
    pub end: String,
    pub plant_ids: String,
}

impl RequestParams {
    pub fn new(start: impl Into<String>, end: impl Into<String>, plant_ids: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            plant_ids: plant_ids.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, caching, rendering or alerting.
#[derive(Debug, Error)]
pub enum HydroError {
    /// Connection failure or timeout before a response arrived.
    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a status other than 200.
    #[error("HTTP error {status} from {url}")]
    UpstreamStatus { url: String, status: u16 },

    /// The upstream answered 200 but the body could not be understood.
    #[error("Malformed response from {url}: {reason}")]
    UpstreamBody { url: String, reason: String },

    /// The request succeeded but nothing usable came back.
    #[error("No data available: {0}")]
    NoData(String),

    /// Cache metadata or payload could not be read back. Mapped to a cache
    /// miss by `CacheManager::load`, never returned to callers of the pipeline.
    #[error("Corrupt cache file {path}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("Alert delivery failed: {0}")]
    Notify(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HydroError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HydroError::Io {
            path: path.into(),
            source,
        }
    }
}
