//! On-disk response cache.
//!
//! A run is identified by the fingerprint of its request parameters. For a
//! fingerprint `k` the cache directory holds:
//!
//! ```text
//! k.data.json     raw records exactly as fetched
//! k.hourly.png    hourly chart of the last run (optional)
//! k.overlay.png   day-overlay chart of the last run (optional)
//! k.meta.json     {fetched_at, last_run, params, version}
//! ```
//!
//! Entries are overwritten on every save, never merged. There is no locking:
//! two concurrent runs for the same fingerprint race and the last writer of
//! the metadata file wins.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logging::DataSource;
use crate::model::{HydroError, Record, RequestParams};

pub mod freshness;

/// Bumped whenever the layout of cached records or metadata changes.
pub const CACHE_VERSION: &str = "3";

/// Directory used when none is configured.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Default time-to-live of a cached report.
pub const DEFAULT_TTL_MINUTES: i64 = 60;

const LOG: &str = DataSource::Cache.target();

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// First 16 hex characters of SHA-256 over `start|end|plant_ids`.
pub fn fingerprint(params: &RequestParams) -> String {
    let joined = [params.start.as_str(), params.end.as_str(), params.plant_ids.as_str()].join("|");
    let digest = Sha256::digest(joined.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

// ---------------------------------------------------------------------------
// Configuration and layout
// ---------------------------------------------------------------------------

/// Where the cache lives and how long entries stay valid.
///
/// Changing the TTL does not touch existing entries; it only changes the
/// comparison made by `load`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR, Duration::minutes(DEFAULT_TTL_MINUTES))
    }
}

/// File paths of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePaths {
    pub data: PathBuf,
    pub hourly: PathBuf,
    pub overlay: PathBuf,
    pub meta: PathBuf,
}

impl CachePaths {
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            data: dir.join(format!("{}.data.json", key)),
            hourly: dir.join(format!("{}.hourly.png", key)),
            overlay: dir.join(format!("{}.overlay.png", key)),
            meta: dir.join(format!("{}.meta.json", key)),
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Charts produced by a run, as written to their output paths.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifacts {
    pub hourly: PathBuf,
    pub overlay: PathBuf,
}

/// A valid cache entry as returned by `CacheManager::load`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub records: Vec<Record>,
    /// Present only if the image file exists.
    pub hourly_path: Option<PathBuf>,
    pub overlay_path: Option<PathBuf>,
    pub fetched_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub params: RequestParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(default)]
    fetched_at: Option<String>,
    #[serde(default)]
    last_run: Option<String>,
    #[serde(default)]
    params: RequestParams,
    #[serde(default)]
    version: Option<String>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct CacheManager {
    config: CacheConfig,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn paths(&self, key: &str) -> CachePaths {
        CachePaths::new(&self.config.dir, key)
    }

    /// Returns the entry for `key` if it exists, matches `CACHE_VERSION` and
    /// is no older than the TTL at `now`.
    ///
    /// Every failure to read the entry back is a miss; corrupt files are
    /// logged, never returned as errors.
    pub fn load(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.try_load(key, now) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: LOG, "Ignoring cache entry {}: {}", key, e);
                None
            }
        }
    }

    fn try_load(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, HydroError> {
        let paths = self.paths(key);
        if !paths.meta.exists() {
            debug!(target: LOG, "Cache miss for {}: no metadata", key);
            return Ok(None);
        }

        let meta: CacheMeta = read_json(&paths.meta)?;

        if meta.version.as_deref() != Some(CACHE_VERSION) {
            debug!(target: LOG, "Cache miss for {}: version {:?}", key, meta.version);
            return Ok(None);
        }

        let Some(fetched_at) = meta.fetched_at.as_deref().and_then(freshness::parse_stored_timestamp)
        else {
            debug!(target: LOG, "Cache miss for {}: no usable fetched_at", key);
            return Ok(None);
        };

        if freshness::is_expired_at(fetched_at, self.config.ttl, now) {
            debug!(target: LOG, "Cache miss for {}: fetched at {} is older than TTL", key, fetched_at);
            return Ok(None);
        }

        if !paths.data.exists() {
            debug!(target: LOG, "Cache miss for {}: payload missing", key);
            return Ok(None);
        }
        let records: Vec<Record> = read_json(&paths.data)?;

        let last_run = meta
            .last_run
            .as_deref()
            .and_then(freshness::parse_stored_timestamp);

        Ok(Some(CacheEntry {
            records,
            hourly_path: paths.hourly.exists().then_some(paths.hourly),
            overlay_path: paths.overlay.exists().then_some(paths.overlay),
            fetched_at,
            last_run,
            params: meta.params,
        }))
    }

    /// Persists a run: records, copies of the rendered charts that exist, and
    /// metadata. Called at the end of every run, hit or miss, so `last_run`
    /// follows invocation recency.
    pub fn save(
        &self,
        records: &[Record],
        artifacts: &RenderedArtifacts,
        key: &str,
        fetched_at: DateTime<Utc>,
        params: &RequestParams,
        last_run: DateTime<Utc>,
    ) -> Result<(), HydroError> {
        let dir = &self.config.dir;
        fs::create_dir_all(dir).map_err(|e| HydroError::io(dir, e))?;
        let paths = self.paths(key);

        write_json(&paths.data, records)?;

        for (source, cached) in [
            (&artifacts.hourly, &paths.hourly),
            (&artifacts.overlay, &paths.overlay),
        ] {
            if source.exists() && !same_file(source, cached) {
                fs::copy(source, cached).map_err(|e| HydroError::io(cached, e))?;
            }
        }

        let meta = CacheMeta {
            fetched_at: Some(fetched_at.to_rfc3339()),
            last_run: Some(last_run.to_rfc3339()),
            params: params.clone(),
            version: Some(CACHE_VERSION.to_string()),
        };
        write_json(&paths.meta, &meta)?;

        info!(target: LOG, "Saved cache entry {} to {}", key, dir.display());
        Ok(())
    }
}

/// Copies a cached chart to the requested output path, creating parent
/// directories. A missing cached chart is a no-op.
pub fn copy_cached_plot(cached: Option<&Path>, destination: &Path) -> Result<(), HydroError> {
    let Some(cached) = cached.filter(|p| p.exists()) else {
        return Ok(());
    };
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| HydroError::io(parent, e))?;
    }
    fs::copy(cached, destination).map_err(|e| HydroError::io(destination, e))?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, HydroError> {
    let text = fs::read_to_string(path).map_err(|e| HydroError::CacheCorruption {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| HydroError::CacheCorruption {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), HydroError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| HydroError::CacheCorruption {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| HydroError::io(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
