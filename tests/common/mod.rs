//! In-memory collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use hydromon_service::alert::telegram::AlertTransport;
use hydromon_service::cache::RenderedArtifacts;
use hydromon_service::ingest::{DischargeSource, SheetSource};
use hydromon_service::model::{HydroError, Record, RequestParams};
use hydromon_service::render::{ChartRenderer, DischargeChart, StylePreset, WaterLevelChart};

/// 2024-10-28 13:00:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 28, 13, 0, 0).unwrap()
}

pub fn records(values: &[Value]) -> Vec<Record> {
    values
        .iter()
        .map(|v| v.as_object().cloned().expect("test records are objects"))
        .collect()
}

/// Two days of hourly discharge with a duplicate and a no-signal row.
pub fn discharge_rows() -> Vec<Record> {
    records(&[
        json!({"thoigianxa": "2024-10-27T22:00:00", "qvevugia": 1200.0, "qvethubon": 900.0}),
        json!({"thoigianxa": "2024-10-27T23:00:00", "qvevugia": 0, "qvethubon": 0}),
        json!({"thoigianxa": "2024-10-28T00:00:00", "qvevugia": 1500.0, "qvethubon": "1100"}),
        json!({"thoigianxa": "2024-10-28T01:00:00", "qvevugia": 4200.0, "qvethubon": 2500.0}),
        json!({"thoigianxa": "2024-10-28T01:00:00", "qvevugia": 5000.0, "qvethubon": 3000.0}),
    ])
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

pub struct FakeDischarge {
    pub rows: Vec<Record>,
    pub calls: RefCell<Vec<RequestParams>>,
    pub fail: bool,
}

impl FakeDischarge {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows,
            calls: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl DischargeSource for FakeDischarge {
    fn fetch(&self, params: &RequestParams) -> Result<Vec<Record>, HydroError> {
        self.calls.borrow_mut().push(params.clone());
        if self.fail {
            return Err(HydroError::UpstreamStatus {
                url: "https://pctt.test/api".to_string(),
                status: 503,
            });
        }
        Ok(self.rows.clone())
    }
}

pub struct FakeSheet(pub Vec<Record>);

impl SheetSource for FakeSheet {
    fn fetch_rows(&self) -> Result<Vec<Record>, HydroError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Writes a marker file for every chart instead of drawing it.
#[derive(Default)]
pub struct RecordingRenderer {
    pub discharge_calls: RefCell<Vec<(RenderedArtifacts, &'static str, usize)>>,
    pub level_calls: RefCell<Vec<(PathBuf, &'static str, Vec<f64>)>>,
    pub shown: RefCell<Vec<PathBuf>>,
}

fn write_marker(path: &Path, text: &str) -> Result<(), HydroError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HydroError::Render(e.to_string()))?;
    }
    std::fs::write(path, text).map_err(|e| HydroError::Render(e.to_string()))
}

impl ChartRenderer for RecordingRenderer {
    fn render_discharge(
        &self,
        chart: &DischargeChart<'_>,
        outputs: &RenderedArtifacts,
        style: &StylePreset,
    ) -> Result<(), HydroError> {
        write_marker(&outputs.hourly, &format!("hourly {}", style.name))?;
        write_marker(&outputs.overlay, &format!("overlay {}", style.name))?;
        self.discharge_calls
            .borrow_mut()
            .push((outputs.clone(), style.name, chart.series.len()));
        Ok(())
    }

    fn render_water_level(
        &self,
        chart: &WaterLevelChart<'_>,
        output: &Path,
        style: &StylePreset,
    ) -> Result<(), HydroError> {
        write_marker(output, &format!("level {}", style.name))?;
        self.level_calls.borrow_mut().push((
            output.to_path_buf(),
            style.name,
            chart.thresholds.iter().map(|r| r.level).collect(),
        ));
        Ok(())
    }

    fn show(&self, image: &Path) -> Result<(), HydroError> {
        self.shown.borrow_mut().push(image.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Alert transports
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Outbox {
    pub sent: RefCell<Vec<String>>,
}

impl AlertTransport for Outbox {
    fn send(&self, text: &str) -> Result<(), HydroError> {
        self.sent.borrow_mut().push(text.to_string());
        Ok(())
    }
}

/// Always fails, counting attempts.
#[derive(Default)]
pub struct BrokenTransport {
    pub attempts: Cell<usize>,
}

impl AlertTransport for BrokenTransport {
    fn send(&self, _text: &str) -> Result<(), HydroError> {
        self.attempts.set(self.attempts.get() + 1);
        Err(HydroError::Notify("Telegram API responded with status 502".to_string()))
    }
}
