/// Đà Nẵng PCTT hydropower report client
///
/// Retrieves the hourly discharge report ("báo cáo thủy điện") published by
/// the Đà Nẵng disaster-prevention portal. Each record carries a release
/// timestamp (`thoigianxa`) and the flows reaching the Vu Gia and Thu Bồn
/// rivers (`qvevugia`, `qvethubon`).
///
/// Query parameters:
///   ngaybatdau      start, e.g. `2024-10-27T00:00:00.000Z`
///   ngayketthuc     end,   e.g. `2024-10-28T23:59:59.000Z`
///   lst_thuydien_id comma-separated plant ids, e.g. `1,2,3,4`

use log::{debug, info};
use serde_json::Value;

use super::{get_text, DischargeSource};
use crate::logging::DataSource;
use crate::model::{HydroError, Record, RequestParams};

pub const DISCHARGE_BASE_URL: &str =
    "https://pctt.danang.gov.vn/DesktopModules/PCTT/api/PCTTApi/baocaothuydiens_thongke";

const LOG: &str = DataSource::Discharge.target();

// ============================================================================
// URL construction
// ============================================================================

/// Percent-encodes a query value, leaving `:` and `,` as-is.
///
/// The API rejects `%3A` inside timestamps and `%2C` inside the id list.
/// A space becomes `%20` rather than the form-style `+`; the portal decodes
/// both the same way.
fn encode_query_value(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%3A", ":")
        .replace("%2C", ",")
}

/// Compose the report endpoint URL for a time window and plant list.
pub fn build_request_url(base_url: &str, params: &RequestParams) -> String {
    format!(
        "{}?ngaybatdau={}&ngayketthuc={}&lst_thuydien_id={}",
        base_url,
        encode_query_value(&params.start),
        encode_query_value(&params.end),
        encode_query_value(&params.plant_ids),
    )
}

/// Request parameters covering one whole UTC calendar day, `date` being
/// `YYYY-MM-DD`.
pub fn day_window(date: &str, plant_ids: &str) -> RequestParams {
    RequestParams::new(
        format!("{}T00:00:00.000Z", date),
        format!("{}T23:59:59.999Z", date),
        plant_ids,
    )
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parse the report body: a JSON array of objects.
///
/// A `null` body means the portal had nothing for the window and yields an
/// empty record set; anything else that is not an array of objects is
/// rejected as malformed.
pub fn parse_records(body: &str, url: &str) -> Result<Vec<Record>, HydroError> {
    let malformed = |reason: String| HydroError::UpstreamBody {
        url: url.to_string(),
        reason,
    };

    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(malformed(format!(
                    "element {} is not an object: {}",
                    i,
                    type_name(&other)
                ))),
            })
            .collect(),
        other => Err(malformed(format!("expected an array, got {}", type_name(&other)))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// API client
// ============================================================================

pub struct DischargeApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl DischargeApi {
    pub fn new(client: reqwest::blocking::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl DischargeSource for DischargeApi {
    fn fetch(&self, params: &RequestParams) -> Result<Vec<Record>, HydroError> {
        let url = build_request_url(&self.base_url, params);
        info!(target: LOG, "Fetching data from: {}", url);

        let body = get_text(&self.client, &url)?;
        let records = parse_records(&body, &url)?;
        debug!(target: LOG, "{} records for {}..{}", records.len(), params.start, params.end);
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================
