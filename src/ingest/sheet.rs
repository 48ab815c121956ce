/// Water-level spreadsheet client
///
/// The provincial gauge readings are kept in a shared Google Sheet and read
/// through its CSV export. Columns used here: `ma_tram` (station code),
/// `thoi_gian` (`YYYY-MM-DD HH:MM:SS`) and `so_lieu` (level in metres).
/// The export is UTF-8 and may start with a byte-order mark.

use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;

use super::{get_text, SheetSource};
use crate::logging::DataSource;
use crate::model::{HydroError, Record};

const SHEET_ID: &str = "1f659giCGHHzrndi2zmJYy82DTNzeOfmro_CxNz-QrMA";
const SHEET_GID: &str = "2051862179";

const LOG: &str = DataSource::Sheet.target();

/// CSV export URL of the published water-level sheet.
pub fn default_sheet_url() -> String {
    format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
        SHEET_ID, SHEET_GID
    )
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Convert CSV text into records keyed by the header row.
///
/// Every value is kept as a JSON string; rows whose cells are all empty are
/// dropped. Short rows are padded with empty strings rather than rejected,
/// since the sheet export trims trailing empty cells.
pub fn parse_csv_content(csv_text: &str) -> Result<Vec<Record>, HydroError> {
    let text = csv_text.strip_prefix('\u{feff}').unwrap_or(csv_text);
    let malformed = |reason: String| HydroError::UpstreamBody {
        url: "csv".to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| malformed(e.to_string()))?;
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let cell = row.get(i).unwrap_or("");
                (header.clone(), Value::String(cell.to_string()))
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// Sources
// ============================================================================

/// Downloads the sheet's CSV export.
pub struct SheetExport {
    client: reqwest::blocking::Client,
    url: String,
}

impl SheetExport {
    pub fn new(client: reqwest::blocking::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl SheetSource for SheetExport {
    fn fetch_rows(&self) -> Result<Vec<Record>, HydroError> {
        info!(target: LOG, "Downloading sheet from: {}", self.url);
        let text = get_text(&self.client, &self.url)?;
        parse_csv_content(&text).map_err(|e| match e {
            HydroError::UpstreamBody { reason, .. } => HydroError::UpstreamBody {
                url: self.url.clone(),
                reason,
            },
            other => other,
        })
    }
}

/// Reads a local copy of the sheet instead of downloading it.
pub struct LocalCsv {
    path: PathBuf,
}

impl LocalCsv {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SheetSource for LocalCsv {
    fn fetch_rows(&self) -> Result<Vec<Record>, HydroError> {
        info!(target: LOG, "Reading local CSV: {}", self.path.display());
        let text = std::fs::read_to_string(&self.path).map_err(|e| HydroError::io(&self.path, e))?;
        parse_csv_content(&text)
    }
}

// ============================================================================
// Tests
// ============================================================================
