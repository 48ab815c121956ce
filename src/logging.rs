/// Structured logging for the river monitoring service
///
/// Implements the `log` facade with source tags, timestamps and severity
/// levels. Supports both console output and an append-only log file, which
/// is what cron-driven runs usually read afterwards.
///
/// Every module logs through `log::{info, warn, error, debug}` with one of the
/// `DataSource` targets, e.g. `info!(target: DataSource::Cache.target(), ...)`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::model::HydroError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Discharge,
    Sheet,
    Cache,
    Render,
    Alert,
    System,
}

impl DataSource {
    /// The `log` target string used for this source.
    pub const fn target(self) -> &'static str {
        match self {
            DataSource::Discharge => "discharge",
            DataSource::Sheet => "sheet",
            DataSource::Cache => "cache",
            DataSource::Render => "render",
            DataSource::Alert => "alert",
            DataSource::System => "system",
        }
    }

    fn from_target(target: &str) -> Option<DataSource> {
        match target {
            "discharge" => Some(DataSource::Discharge),
            "sheet" => Some(DataSource::Sheet),
            "cache" => Some(DataSource::Cache),
            "render" => Some(DataSource::Render),
            "alert" => Some(DataSource::Alert),
            "system" => Some(DataSource::System),
            _ => None,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Discharge => write!(f, "THUYDIEN"),
            DataSource::Sheet => write!(f, "SHEET"),
            DataSource::Cache => write!(f, "CACHE"),
            DataSource::Render => write!(f, "PLOT"),
            DataSource::Alert => write!(f, "ALERT"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - upstream had nothing for the requested window
    Expected,
    /// Unexpected failure - indicates service degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a run failure so the scheduler log distinguishes "nothing to
/// report yet" from "the upstream changed or is down".
pub fn classify_failure(err: &HydroError) -> FailureType {
    match err {
        HydroError::NoData(_) => FailureType::Expected,
        HydroError::UpstreamStatus { .. } | HydroError::UpstreamBody { .. } => {
            FailureType::Unexpected
        }
        HydroError::Network { .. } => FailureType::Unknown,
        HydroError::Config(_) | HydroError::Render(_) | HydroError::Io { .. } => {
            FailureType::Unexpected
        }
        HydroError::CacheCorruption { .. } | HydroError::Notify(_) => FailureType::Unknown,
    }
}

/// Log a failed operation at a level matching its classification.
pub fn log_failure(source: DataSource, operation: &str, err: &HydroError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => log::warn!(target: source.target(), "{}", message),
        FailureType::Unexpected => log::error!(target: source.target(), "{}", message),
        FailureType::Unknown => log::warn!(target: source.target(), "{}", message),
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct Logger {
    /// Minimum log level to display
    min_level: LevelFilter,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn new(min_level: LevelFilter, log_file: Option<String>, console_timestamps: bool) -> Self {
        Logger {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    fn format_entry(&self, record: &Record) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let source = DataSource::from_target(record.target())
            .map(|s| s.to_string())
            .unwrap_or_else(|| record.target().to_string());
        format!("{} {} {}: {}", timestamp, level_tag(record.level()), source, record.args())
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let log_entry = self.format_entry(record);

        // Console output
        if self.console_timestamps {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{}", log_entry),
                _ => println!("{}", log_entry),
            }
        } else {
            match record.level() {
                Level::Error => eprintln!("   ✗ {}", record.args()),
                Level::Warn => eprintln!("   ⚠ {}", record.args()),
                Level::Info => println!("   {}", record.args()),
                Level::Debug | Level::Trace => println!("   [DEBUG] {}", record.args()),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn flush(&self) {}
}

/// Install the process-wide logger. Calling it twice keeps the first logger.
pub fn init_logger(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) {
    let logger = Logger::new(min_level, log_file.map(String::from), console_timestamps);
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(min_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_round_trip_to_sources() {
        for source in [
            DataSource::Discharge,
            DataSource::Sheet,
            DataSource::Cache,
            DataSource::Render,
            DataSource::Alert,
            DataSource::System,
        ] {
            assert_eq!(DataSource::from_target(source.target()), Some(source));
        }
        assert_eq!(DataSource::from_target("reqwest::connect"), None);
    }

    #[test]
    fn test_failure_classification() {
        let empty = HydroError::NoData("API returned zero records".into());
        assert_eq!(classify_failure(&empty), FailureType::Expected);

        let http = HydroError::UpstreamStatus {
            url: "https://example.test".into(),
            status: 500,
        };
        assert_eq!(classify_failure(&http), FailureType::Unexpected);
    }

    #[test]
    fn test_logger_filters_below_min_level() {
        let logger = Logger::new(LevelFilter::Warn, None, false);
        let info = Metadata::builder().level(Level::Info).target("cache").build();
        let warn = Metadata::builder().level(Level::Warn).target("cache").build();
        assert!(!logger.enabled(&info));
        assert!(logger.enabled(&warn));
    }

    #[test]
    fn test_log_file_receives_tagged_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = Logger::new(
            LevelFilter::Info,
            Some(path.to_string_lossy().into_owned()),
            true,
        );
        logger.log(
            &Record::builder()
                .args(format_args!("cache hit"))
                .level(Level::Info)
                .target("cache")
                .build(),
        );
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("INFO CACHE: cache hit"), "got: {}", written);
    }
}
