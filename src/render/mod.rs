//! Chart rendering.
//!
//! The pipeline only talks to `ChartRenderer`; `PlottersRenderer` is the PNG
//! implementation used by the binary. Renderers create parent directories of
//! their output paths.

use std::path::Path;

use crate::analysis::marked::MarkedMaxima;
use crate::analysis::overlay::OverlayBuckets;
use crate::cache::RenderedArtifacts;
use crate::model::{HydroError, Series, ThresholdRule};

mod plot;

pub use plot::PlottersRenderer;

/// Sizes used for one output variant. Pixel sizes correspond to the figure
/// sizes in inches at 150 dpi; font sizes are in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StylePreset {
    pub name: &'static str,
    pub hourly_size: (u32, u32),
    pub overlay_size: (u32, u32),
    pub level_size: (u32, u32),
    pub title_size: u32,
    pub label_size: u32,
    pub tick_size: u32,
    pub legend_size: u32,
    pub annot_size: u32,
}

pub const DESKTOP: StylePreset = StylePreset {
    name: "desktop",
    hourly_size: (1800, 900),
    overlay_size: (1800, 1500),
    level_size: (1800, 900),
    title_size: 38,
    label_size: 25,
    tick_size: 23,
    legend_size: 23,
    annot_size: 21,
};

pub const MOBILE: StylePreset = StylePreset {
    name: "mobile",
    hourly_size: (930, 1425),
    overlay_size: (930, 1725),
    level_size: (975, 1500),
    title_size: 42,
    label_size: 29,
    tick_size: 27,
    legend_size: 27,
    annot_size: 25,
};

/// Everything drawn on the discharge report.
pub struct DischargeChart<'a> {
    /// Timeline plus Vu Gia (field 0) and Thu Bồn (field 1) flows.
    pub series: &'a Series,
    pub overlay: &'a OverlayBuckets,
    /// Reference maxima drawn as horizontal lines; zero maxima are skipped.
    pub marked: &'a MarkedMaxima,
}

/// Everything drawn on a water-level chart.
pub struct WaterLevelChart<'a> {
    pub series: &'a Series,
    pub station: &'a str,
    pub thresholds: &'a [ThresholdRule],
}

pub trait ChartRenderer {
    /// Writes the hourly chart and the day-overlay chart.
    fn render_discharge(
        &self,
        chart: &DischargeChart<'_>,
        outputs: &RenderedArtifacts,
        style: &StylePreset,
    ) -> Result<(), HydroError>;

    fn render_water_level(
        &self,
        chart: &WaterLevelChart<'_>,
        output: &Path,
        style: &StylePreset,
    ) -> Result<(), HydroError>;

    /// Re-displays an image that was already rendered. Missing files are
    /// ignored.
    fn show(&self, image: &Path) -> Result<(), HydroError>;
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), HydroError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| HydroError::io(parent, e))
        }
        _ => Ok(()),
    }
}
