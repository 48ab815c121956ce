/// Upstream data clients.
///
/// Submodules:
/// - `discharge` — hydropower discharge report API (JSON).
/// - `sheet` — water-level spreadsheet export (CSV), or a local CSV copy.
///
/// Both clients issue exactly one blocking request per call with a fixed
/// timeout and never retry; the scheduler re-runs the whole job instead.

use std::time::Duration;

use crate::model::{HydroError, Record, RequestParams};

pub mod discharge;
pub mod sheet;

/// Per-request timeout for data downloads.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything that can answer a discharge query with raw records.
pub trait DischargeSource {
    fn fetch(&self, params: &RequestParams) -> Result<Vec<Record>, HydroError>;
}

/// Anything that can produce the rows of the water-level sheet.
pub trait SheetSource {
    fn fetch_rows(&self) -> Result<Vec<Record>, HydroError>;
}

/// Builds the blocking HTTP client shared by the data sources.
pub fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, HydroError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HydroError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Sends a GET and returns the body of a 200 response.
///
/// Transport failures map to `Network`, any other status to `UpstreamStatus`.
pub(crate) fn get_text(client: &reqwest::blocking::Client, url: &str) -> Result<String, HydroError> {
    let response = client.get(url).send().map_err(|source| HydroError::Network {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(HydroError::UpstreamStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().map_err(|source| HydroError::Network {
        url: url.to_string(),
        source,
    })
}
