//! One report run: fetch → normalize → cache-or-reuse → render → notify.
//!
//! Both runs take their collaborators as trait objects and the current time
//! as a parameter, so tests drive them with in-memory sources, a recording
//! renderer and a fixed clock.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};

use crate::alert::telegram::{maybe_notify, AlertTransport};
use crate::alert::thresholds::{check_flood_stage, check_rising_edge, FloodStage};
use crate::analysis::marked::{fetch_marked_date_maxima, MarkedMaxima};
use crate::analysis::overlay::bucketize;
use crate::analysis::series::{extract_discharge, water_level_series};
use crate::cache::{copy_cached_plot, fingerprint, CacheManager, RenderedArtifacts};
use crate::config::overlay_path_for;
use crate::ingest::{DischargeSource, SheetSource};
use crate::logging::{log_failure, DataSource};
use crate::model::{HydroError, Reading, RequestParams};
use crate::render::{ChartRenderer, DischargeChart, WaterLevelChart, DESKTOP, MOBILE};
use crate::stations::{thresholds_for, DISCHARGE_SERIES};

const LOG: &str = DataSource::System.target();

/// Where threshold alerts go and the level that triggers them.
#[derive(Clone, Copy)]
pub struct AlertTarget<'a> {
    pub transport: &'a dyn AlertTransport,
    pub threshold: f64,
}

// ---------------------------------------------------------------------------
// Discharge report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DischargeJob {
    pub params: RequestParams,
    /// Desktop hourly chart; the overlay chart goes beside it.
    pub output: PathBuf,
    /// Mobile hourly and overlay charts, always rendered fresh.
    pub mobile: Option<(PathBuf, PathBuf)>,
    pub marked_dates: Vec<String>,
    pub show: bool,
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DischargeSummary {
    pub cache_key: String,
    pub from_cache: bool,
    /// False when cached charts were copied instead.
    pub rendered: bool,
    pub artifacts: RenderedArtifacts,
    pub points: usize,
    pub latest: Vec<Reading>,
    pub alert_sent: bool,
}

pub fn run_discharge_report(
    job: &DischargeJob,
    source: &dyn DischargeSource,
    renderer: &dyn ChartRenderer,
    cache: &CacheManager,
    alerts: Option<AlertTarget<'_>>,
    now: DateTime<Utc>,
) -> Result<DischargeSummary, HydroError> {
    let key = fingerprint(&job.params);

    let cached = if job.force_refresh {
        info!(target: LOG, "Cache bypassed (--force-refresh)");
        None
    } else {
        cache.load(&key, now)
    };
    let from_cache = cached.is_some();

    let (records, fetched_at, cached_hourly, cached_overlay) = match cached {
        Some(entry) => {
            info!(target: LOG, "Using cached data fetched at {}", entry.fetched_at.to_rfc3339());
            (entry.records, entry.fetched_at, entry.hourly_path, entry.overlay_path)
        }
        None => {
            let records = source.fetch(&job.params)?;
            if records.is_empty() {
                return Err(HydroError::NoData(format!(
                    "no data returned from the API for {}..{}",
                    job.params.start, job.params.end
                )));
            }
            (records, now, None, None)
        }
    };

    let series = extract_discharge(&records);
    if series.is_empty() {
        return Err(HydroError::NoData(format!(
            "{} records but no usable rows for {}..{}",
            records.len(),
            job.params.start,
            job.params.end
        )));
    }
    let overlay = bucketize(&series.timeline, &[series.field(0), series.field(1)]);

    let marked: MarkedMaxima = if job.marked_dates.is_empty() {
        MarkedMaxima::new()
    } else {
        fetch_marked_date_maxima(&job.marked_dates, &job.params.plant_ids, source, &cache.config().dir)
    };

    let chart = DischargeChart {
        series: &series,
        overlay: &overlay,
        marked: &marked,
    };
    let artifacts = RenderedArtifacts {
        hourly: job.output.clone(),
        overlay: overlay_path_for(&job.output),
    };

    let rendered = match (cached_hourly.as_deref(), cached_overlay.as_deref()) {
        (Some(hourly), Some(overlay)) => {
            copy_cached_plot(Some(hourly), &artifacts.hourly)?;
            copy_cached_plot(Some(overlay), &artifacts.overlay)?;
            info!(target: LOG, "Reused cached charts for {}", key);
            false
        }
        _ => {
            renderer.render_discharge(&chart, &artifacts, &DESKTOP)?;
            true
        }
    };
    if job.show {
        show_all(renderer, &[&artifacts.hourly, &artifacts.overlay]);
    }

    if let Some((hourly, overlay)) = &job.mobile {
        let mobile = RenderedArtifacts {
            hourly: hourly.clone(),
            overlay: overlay.clone(),
        };
        renderer.render_discharge(&chart, &mobile, &MOBILE)?;
    }

    let latest = latest_readings(&series.timeline, &[series.field(0), series.field(1)]);
    let alert_sent = alerts
        .map(|target| notify_or_log(&latest, target))
        .unwrap_or(false);

    if let Err(e) = cache.save(&records, &artifacts, &key, fetched_at, &job.params, now) {
        log_failure(DataSource::Cache, "cache save", &e);
    }

    Ok(DischargeSummary {
        cache_key: key,
        from_cache,
        rendered,
        artifacts,
        points: series.len(),
        latest,
        alert_sent,
    })
}

/// One reading per discharge series at the last timestamp.
fn latest_readings(timeline: &[NaiveDateTime], fields: &[&[f64]]) -> Vec<Reading> {
    let Some(last) = timeline.last() else {
        return Vec::new();
    };
    let stamp = last.format("%Y-%m-%d %H:%M").to_string();
    DISCHARGE_SERIES
        .iter()
        .zip(fields)
        .filter_map(|(meta, values)| {
            values
                .last()
                .map(|v| Reading::new(meta.label, *v, Some(stamp.clone())))
        })
        .collect()
}

fn notify_or_log(readings: &[Reading], target: AlertTarget<'_>) -> bool {
    match maybe_notify(readings, target.threshold, Some(target.transport)) {
        Ok(sent) => sent,
        Err(e) => {
            log_failure(DataSource::Alert, "threshold alert", &e);
            false
        }
    }
}

fn show_all(renderer: &dyn ChartRenderer, images: &[&Path]) {
    for image in images {
        if let Err(e) = renderer.show(image) {
            warn!(target: LOG, "Could not display {}: {}", image.display(), e);
        }
    }
}

// ---------------------------------------------------------------------------
// Water-level report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WaterLevelJob {
    pub station: String,
    pub output: PathBuf,
    pub mobile_output: Option<PathBuf>,
    pub show: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterLevelSummary {
    pub points: usize,
    pub latest: Option<(NaiveDateTime, f64)>,
    pub stage: Option<FloodStage>,
    pub alert_sent: bool,
}

/// Charts one station's level. Water-level runs are not cached; the sheet
/// is small and re-downloaded on every run.
pub fn run_water_level_report(
    job: &WaterLevelJob,
    source: &dyn SheetSource,
    renderer: &dyn ChartRenderer,
    transport: Option<&dyn AlertTransport>,
) -> Result<WaterLevelSummary, HydroError> {
    let rows = source.fetch_rows()?;
    let series = water_level_series(&rows, &job.station)?;
    let rules = thresholds_for(&job.station);
    let levels = series.field(0);
    let latest = series.latest(0);

    let stage = latest.and_then(|(_, level)| check_flood_stage(level, rules));
    match (&latest, &stage) {
        (Some((time, level)), Some(stage)) => warn!(
            target: LOG,
            "Station {} at {:.2} m ({}) is above {} ({:.2} m)",
            job.station, level, time, stage.rule.label, stage.rule.level
        ),
        (Some((time, level)), None) => {
            info!(target: LOG, "Station {} at {:.2} m ({})", job.station, level, time)
        }
        _ => {}
    }

    let mut alert_sent = false;
    if let Some(transport) = transport {
        if let Some(alert) = check_rising_edge(&series.timeline, levels, &job.station, rules) {
            match transport.send(&alert.message) {
                Ok(()) => {
                    info!(target: DataSource::Alert.target(), "Sent rising-level alert for {}", job.station);
                    alert_sent = true;
                }
                Err(e) => log_failure(DataSource::Alert, "rising-level alert", &e),
            }
        }
    }

    let chart = WaterLevelChart {
        series: &series,
        station: &job.station,
        thresholds: rules,
    };
    renderer.render_water_level(&chart, &job.output, &DESKTOP)?;
    if job.show {
        show_all(renderer, &[&job.output]);
    }
    if let Some(mobile) = &job.mobile_output {
        renderer.render_water_level(&chart, mobile, &MOBILE)?;
    }

    Ok(WaterLevelSummary {
        points: series.len(),
        latest,
        stage,
        alert_sent,
    })
}
