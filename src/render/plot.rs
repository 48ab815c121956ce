//! PNG charts drawn with `plotters`.
//!
//! Time axes are plotted as hours since a reference instant (the first
//! point of the timeline, or midnight for overlays) and labelled back as
//! clock times.

use std::path::Path;
use std::process::Command;

use chrono::{Duration, NaiveDateTime, Timelike};
use log::info;
use plotters::prelude::*;

use super::{ensure_parent_dir, ChartRenderer, DischargeChart, StylePreset, WaterLevelChart};
use crate::analysis::overlay::OverlayBuckets;
use crate::cache::RenderedArtifacts;
use crate::logging::DataSource;
use crate::model::{HydroError, Series};
use crate::stations::DISCHARGE_SERIES;

const LOG: &str = DataSource::Render.target();
const FONT: &str = "sans-serif";

const SERIES_COLORS: [RGBColor; 2] = [RGBColor(31, 119, 180), RGBColor(44, 160, 44)];
const MARK_COLORS: [RGBColor; 5] = [
    RGBColor(255, 127, 14),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
];

fn draw_err<E: std::fmt::Display>(e: E) -> HydroError {
    HydroError::Render(e.to_string())
}

// ---------------------------------------------------------------------------
// Axis helpers
// ---------------------------------------------------------------------------

fn hours_between(origin: NaiveDateTime, t: NaiveDateTime) -> f64 {
    (t - origin).num_seconds() as f64 / 3600.0
}

fn hour_of_day(t: NaiveDateTime) -> f64 {
    t.num_seconds_from_midnight() as f64 / 3600.0
}

fn x_range(xs: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-9 { (lo - 1.0, hi + 1.0) } else { (lo, hi) }
}

fn y_range(ys: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi - lo < 1e-9 { lo.abs().max(1.0) * 0.05 } else { (hi - lo) * 0.05 };
    (lo - pad, hi + pad)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct PlottersRenderer;

impl PlottersRenderer {
    pub fn new() -> Self {
        PlottersRenderer
    }

    fn draw_hourly(&self, chart: &DischargeChart<'_>, path: &Path, style: &StylePreset) -> Result<(), HydroError> {
        let series = chart.series;
        let Some(&origin) = series.timeline.first() else {
            return Err(HydroError::NoData("nothing to plot".to_string()));
        };

        let xs: Vec<f64> = series.timeline.iter().map(|t| hours_between(origin, *t)).collect();
        let marks: Vec<(usize, &String, f64, f64)> = chart
            .marked
            .iter()
            .enumerate()
            .map(|(i, (date, (vu, thu)))| (i, date, *vu, *thu))
            .collect();
        let (x0, x1) = x_range(xs.iter().copied());
        let (y0, y1) = y_range(
            series
                .values
                .iter()
                .flatten()
                .copied()
                .chain(marks.iter().flat_map(|(_, _, vu, thu)| [*vu, *thu]).filter(|v| *v > 0.0)),
        );

        let root = BitMapBackend::new(path, style.hourly_size).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut ctx = ChartBuilder::on(&root)
            .caption("Diễn biến theo giờ", (FONT, style.title_size))
            .margin(20)
            .x_label_area_size(style.tick_size * 5)
            .y_label_area_size(style.tick_size * 4)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(draw_err)?;

        let label_time = |h: &f64| {
            (origin + Duration::seconds((h * 3600.0).round() as i64))
                .format("%Y-%m-%d %H:%M")
                .to_string()
        };
        ctx.configure_mesh()
            .x_desc("Thời gian xả")
            .y_desc("Lưu lượng")
            .x_labels(8)
            .x_label_formatter(&label_time)
            .label_style((FONT, style.tick_size))
            .axis_desc_style((FONT, style.label_size))
            .draw()
            .map_err(draw_err)?;

        for (idx, meta) in DISCHARGE_SERIES.iter().enumerate() {
            let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
            let ys = series.field(idx);
            ctx.draw_series(LineSeries::new(
                xs.iter().copied().zip(ys.iter().copied()),
                color.stroke_width(2),
            ))
            .map_err(draw_err)?
            .label(meta.label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

            if let (Some(&x), Some(&y)) = (xs.last(), ys.last()) {
                ctx.draw_series(std::iter::once(Circle::new((x, y), 6, color.filled())))
                    .map_err(draw_err)?;
                ctx.draw_series(std::iter::once(Text::new(
                    format!("{:.1}", y),
                    (x, y),
                    (FONT, style.annot_size).into_font().color(&color),
                )))
                .map_err(draw_err)?;
            }
        }

        for (i, date, vu, thu) in &marks {
            let color = MARK_COLORS[i % MARK_COLORS.len()];
            for (level, river) in [(*vu, "VG"), (*thu, "TB")] {
                if level <= 0.0 {
                    continue;
                }
                ctx.draw_series(LineSeries::new(
                    vec![(x0, level), (x1, level)],
                    color.mix(0.7).stroke_width(1),
                ))
                .map_err(draw_err)?
                .label(format!("{} {} max={:.0}", date, river, level))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
        }

        ctx.configure_series_labels()
            .label_font((FONT, style.legend_size))
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
        info!(target: LOG, "Saved hourly plot to {}", path.display());
        Ok(())
    }

    fn draw_overlay(&self, overlay: &OverlayBuckets, path: &Path, style: &StylePreset) -> Result<(), HydroError> {
        let root = BitMapBackend::new(path, style.overlay_size).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;
        let root = root
            .titled("Báo cáo thủy điện", (FONT, style.title_size))
            .map_err(draw_err)?;
        let panels = root.split_evenly((2, 1));

        for (idx, (panel, meta)) in panels.iter().zip(DISCHARGE_SERIES).enumerate() {
            let (y0, y1) = y_range(overlay.values().flat_map(|b| b.series(idx).iter().copied()));
            let mut ctx = ChartBuilder::on(panel)
                .caption(
                    format!("{} - So sánh từng ngày theo giờ", meta.label),
                    (FONT, style.label_size + 4),
                )
                .margin(15)
                .x_label_area_size(style.tick_size * 3)
                .y_label_area_size(style.tick_size * 4)
                .build_cartesian_2d(0.0..24.0, y0..y1)
                .map_err(draw_err)?;

            ctx.configure_mesh()
                .x_desc("Thời gian xả")
                .y_desc("Lưu lượng")
                .x_labels(13)
                .x_label_formatter(&|h: &f64| {
                    let minutes = (h * 60.0).round() as i64;
                    format!("{:02}:{:02}", minutes / 60, minutes % 60)
                })
                .label_style((FONT, style.tick_size))
                .axis_desc_style((FONT, style.label_size))
                .draw()
                .map_err(draw_err)?;

            for (day_idx, (label, bucket)) in overlay.iter().enumerate() {
                let color = Palette99::pick(day_idx).to_rgba();
                let points: Vec<(f64, f64)> = bucket
                    .times
                    .iter()
                    .map(|t| hour_of_day(*t))
                    .zip(bucket.series(idx).iter().copied())
                    .collect();
                ctx.draw_series(LineSeries::new(points, color.stroke_width(2)))
                    .map_err(draw_err)?
                    .label(label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }

            ctx.configure_series_labels()
                .label_font((FONT, style.legend_size))
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(draw_err)?;
        }

        root.present().map_err(draw_err)?;
        info!(target: LOG, "Saved overlay plot to {}", path.display());
        Ok(())
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render_discharge(
        &self,
        chart: &DischargeChart<'_>,
        outputs: &RenderedArtifacts,
        style: &StylePreset,
    ) -> Result<(), HydroError> {
        ensure_parent_dir(&outputs.hourly)?;
        ensure_parent_dir(&outputs.overlay)?;
        self.draw_hourly(chart, &outputs.hourly, style)?;
        self.draw_overlay(chart.overlay, &outputs.overlay, style)
    }

    fn render_water_level(
        &self,
        chart: &WaterLevelChart<'_>,
        output: &Path,
        style: &StylePreset,
    ) -> Result<(), HydroError> {
        ensure_parent_dir(output)?;
        let series: &Series = chart.series;
        let Some(&origin) = series.timeline.first() else {
            return Err(HydroError::NoData(format!("nothing to plot for station {}", chart.station)));
        };

        let levels = series.field(0);
        let xs: Vec<f64> = series.timeline.iter().map(|t| hours_between(origin, *t)).collect();
        let (x0, x1) = x_range(xs.iter().copied());
        let (y0, y1) = y_range(levels.iter().copied().chain(chart.thresholds.iter().map(|r| r.level)));

        let root = BitMapBackend::new(output, style.level_size).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut ctx = ChartBuilder::on(&root)
            .caption(
                format!("Diễn biến mực nước trạm {}", chart.station),
                (FONT, style.title_size),
            )
            .margin(20)
            .x_label_area_size(style.tick_size * 5)
            .y_label_area_size(style.tick_size * 4)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(draw_err)?;

        let label_time = |h: &f64| {
            (origin + Duration::seconds((h * 3600.0).round() as i64))
                .format("%Y-%m-%d %H:%M")
                .to_string()
        };
        ctx.configure_mesh()
            .x_desc("Thời gian")
            .y_desc("Mực nước (m)")
            .x_labels(8)
            .x_label_formatter(&label_time)
            .label_style((FONT, style.tick_size))
            .axis_desc_style((FONT, style.label_size))
            .draw()
            .map_err(draw_err)?;

        let line_color = SERIES_COLORS[0];
        ctx.draw_series(LineSeries::new(
            xs.iter().copied().zip(levels.iter().copied()),
            line_color.stroke_width(3),
        ))
        .map_err(draw_err)?
        .label("Mực nước")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_color));

        for (i, rule) in chart.thresholds.iter().enumerate() {
            let color = MARK_COLORS[i % MARK_COLORS.len()];
            ctx.draw_series(LineSeries::new(
                vec![(x0, rule.level), (x1, rule.level)],
                color.stroke_width(2),
            ))
            .map_err(draw_err)?
            .label(format!("{} = {}", rule.label, rule.level))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        if let (Some(&x), Some(&y)) = (xs.last(), levels.last()) {
            ctx.draw_series(std::iter::once(Circle::new((x, y), 7, line_color.filled())))
                .map_err(draw_err)?;
            ctx.draw_series(std::iter::once(Text::new(
                format!("{:.2} m", y),
                (x, y),
                (FONT, style.annot_size).into_font().color(&line_color),
            )))
            .map_err(draw_err)?;
        }

        ctx.configure_series_labels()
            .label_font((FONT, style.legend_size))
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
        info!(target: LOG, "Saved plot to {}", output.display());
        Ok(())
    }

    fn show(&self, image: &Path) -> Result<(), HydroError> {
        if !image.exists() {
            return Ok(());
        }
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        } else {
            Command::new("xdg-open")
        };
        command
            .arg(image)
            .spawn()
            .map(|_| ())
            .map_err(|e| HydroError::Render(format!("cannot open {}: {}", image.display(), e)))
    }
}
