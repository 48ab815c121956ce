//! Water-level report integration tests
//!
//! Sheet rows go through station filtering, the rising-edge alert and the
//! renderer; a local CSV file is read the same way as the sheet export.

mod common;

use serde_json::json;

use common::*;
use hydromon_service::alert::thresholds::FloodSeverity;
use hydromon_service::ingest::sheet::LocalCsv;
use hydromon_service::model::{HydroError, Record};
use hydromon_service::pipeline::{run_water_level_report, WaterLevelJob};

fn job(out_dir: &std::path::Path) -> WaterLevelJob {
    WaterLevelJob {
        station: "553300".to_string(),
        output: out_dir.join("tram_ainghia_plot.png"),
        mobile_output: None,
        show: false,
    }
}

fn level_rows(levels: &[(&str, &str)]) -> Vec<Record> {
    let mut rows: Vec<serde_json::Value> = levels
        .iter()
        .map(|(time, level)| json!({"ma_tram": "553300", "thoi_gian": time, "so_lieu": level}))
        .collect();
    // Another station in the same sheet must never leak into the chart.
    rows.push(json!({"ma_tram": "553400", "thoi_gian": "2024-10-28 23:00:00", "so_lieu": "99.0"}));
    records(&rows)
}

#[test]
fn test_rising_above_top_level_sends_one_alert() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = FakeSheet(level_rows(&[
        ("2024-10-28 10:00:00", "8.5"),
        ("2024-10-28 11:00:00", "9.2"),
    ]));
    let renderer = RecordingRenderer::default();
    let outbox = Outbox::default();

    let summary = run_water_level_report(&job(dir.path()), &sheet, &renderer, Some(&outbox)).unwrap();

    assert!(summary.alert_sent);
    assert_eq!(summary.points, 2);
    assert_eq!(summary.latest.map(|(_, v)| v), Some(9.2));
    let stage = summary.stage.expect("9.2 is above BĐ3");
    assert_eq!(stage.rule.label, "BĐ3");
    assert_eq!(stage.severity, FloodSeverity::Emergency);

    let sent = outbox.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Mực nước trạm 553300 đạt 9.20 m lúc 2024-10-28 11:00"), "{}", sent[0]);
}

#[test]
fn test_falling_level_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = FakeSheet(level_rows(&[
        ("2024-10-28 10:00:00", "9.5"),
        ("2024-10-28 11:00:00", "9.2"),
    ]));
    let outbox = Outbox::default();

    let summary =
        run_water_level_report(&job(dir.path()), &sheet, &RecordingRenderer::default(), Some(&outbox)).unwrap();

    assert!(!summary.alert_sent);
    assert!(outbox.sent.borrow().is_empty());
}

#[test]
fn test_chart_carries_station_thresholds_and_mobile_variant() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = FakeSheet(level_rows(&[
        ("2024-10-28 10:00:00", "5.1"),
        ("2024-10-28 11:00:00", "bad"),
        ("2024-10-28 12:00:00", "5.3"),
    ]));
    let renderer = RecordingRenderer::default();
    let mut with_mobile = job(dir.path());
    with_mobile.mobile_output = Some(dir.path().join("mobile/tram.png"));
    with_mobile.show = true;

    let summary = run_water_level_report(&with_mobile, &sheet, &renderer, None).unwrap();

    assert_eq!(summary.points, 2, "unreadable level skipped");
    assert_eq!(summary.stage, None);
    let calls = renderer.level_calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, "desktop");
    assert_eq!(calls[0].2, vec![6.5, 8.0, 9.0]);
    assert_eq!(calls[1].0, dir.path().join("mobile/tram.png"));
    assert_eq!(calls[1].1, "mobile");
    assert_eq!(renderer.shown.borrow().as_slice(), &[dir.path().join("tram_ainghia_plot.png")]);
}

#[test]
fn test_unknown_station_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = FakeSheet(level_rows(&[("2024-10-28 10:00:00", "5.1")]));
    let mut other = job(dir.path());
    other.station = "000000".to_string();
    let renderer = RecordingRenderer::default();

    let err = run_water_level_report(&other, &sheet, &renderer, None).unwrap_err();
    assert!(matches!(err, HydroError::NoData(_)));
    assert!(renderer.level_calls.borrow().is_empty());
}

#[test]
fn test_alert_failure_still_renders_chart() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = FakeSheet(level_rows(&[
        ("2024-10-28 10:00:00", "9.1"),
        ("2024-10-28 11:00:00", "9.4"),
    ]));
    let renderer = RecordingRenderer::default();
    let broken = BrokenTransport::default();

    let summary = run_water_level_report(&job(dir.path()), &sheet, &renderer, Some(&broken)).unwrap();

    assert_eq!(broken.attempts.get(), 1);
    assert!(!summary.alert_sent);
    assert_eq!(renderer.level_calls.borrow().len(), 1);
}

#[test]
fn test_local_csv_with_bom_feeds_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("ainghia.csv");
    std::fs::write(
        &csv_path,
        "\u{feff}ma_tram,thoi_gian,so_lieu\n\
         553300,2024-10-28 10:00:00,7.10\n\
         553300,2024-10-28 11:00:00,8.25\n\
         ,,\n",
    )
    .unwrap();

    let summary = run_water_level_report(
        &job(dir.path()),
        &LocalCsv::new(&csv_path),
        &RecordingRenderer::default(),
        None,
    )
    .unwrap();

    assert_eq!(summary.points, 2);
    assert_eq!(summary.latest.map(|(_, v)| v), Some(8.25));
    assert_eq!(summary.stage.map(|s| s.rule.label), Some("BĐ2"));
}

#[test]
fn test_missing_local_csv_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_water_level_report(
        &job(dir.path()),
        &LocalCsv::new(dir.path().join("missing.csv")),
        &RecordingRenderer::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, HydroError::Io { .. }));
}
