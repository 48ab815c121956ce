//! Telegram delivery of threshold alerts.
//!
//! Messages are sent with the Bot API `sendMessage` method in HTML parse
//! mode. Credentials come from the environment (`TELEGRAM_BOT_TOKEN`,
//! `TELEGRAM_CHAT_ID`, optional `TELEGRAM_THRESHOLD`) or, for the
//! water-level report, from the command line.

use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use crate::logging::DataSource;
use crate::model::{HydroError, Reading};

const LOG: &str = DataSource::Alert.target();

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-request timeout for `sendMessage`.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Discharge threshold (m³/s) used when `TELEGRAM_THRESHOLD` is unset.
pub const DEFAULT_THRESHOLD: f64 = 6000.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub threshold: f64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>, threshold: f64) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            threshold,
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// Returns `Ok(None)` when the token or chat id is missing or empty, and a
    /// `Config` error when `TELEGRAM_THRESHOLD` is set but not a number.
    pub fn from_env() -> Result<Option<Self>, HydroError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Option<Self>, HydroError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (Some(token), Some(chat_id)) = (non_empty("TELEGRAM_BOT_TOKEN"), non_empty("TELEGRAM_CHAT_ID"))
        else {
            return Ok(None);
        };

        let threshold = match non_empty("TELEGRAM_THRESHOLD") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                HydroError::Config(format!("TELEGRAM_THRESHOLD is not a number: {:?}", raw))
            })?,
            None => DEFAULT_THRESHOLD,
        };

        Ok(Some(Self::new(token, chat_id, threshold)))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Something that can deliver one alert message.
pub trait AlertTransport {
    fn send(&self, text: &str) -> Result<(), HydroError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub struct TelegramClient {
    client: reqwest::blocking::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, HydroError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| HydroError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, TELEGRAM_API_BASE, config))
    }

    pub fn with_client(
        client: reqwest::blocking::Client,
        api_base: impl Into<String>,
        config: &TelegramConfig,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base.trim_end_matches('/'), self.bot_token)
    }
}

impl AlertTransport for TelegramClient {
    fn send(&self, text: &str) -> Result<(), HydroError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        // The token is part of the URL; never log the endpoint itself.
        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .map_err(|e| HydroError::Notify(format!("request to Telegram failed: {}", e.without_url())))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HydroError::Notify(format!(
                "Telegram API responded with status {}",
                status.as_u16()
            )));
        }

        debug!(target: LOG, "Telegram accepted message for chat {}", self.chat_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Formats a number with at most six significant digits and no trailing
/// zeros, switching to exponent notation outside `1e-4..1e6`.
fn format_significant(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    // Rounding can carry into the next power of ten, so take the exponent
    // from the rounded form.
    let scientific = format!("{:.5e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Builds the alert text for the readings strictly above `threshold`.
/// Returns `None` when no reading exceeds it.
pub fn compose_threshold_message(readings: &[Reading], threshold: f64) -> Option<String> {
    let exceeded: Vec<&Reading> = readings.iter().filter(|r| r.value > threshold).collect();
    if exceeded.is_empty() {
        return None;
    }

    let mut lines = vec![
        "⚠️ <b>Cảnh báo lưu lượng</b>".to_string(),
        format!("Ngưỡng: {}", format_significant(threshold)),
        String::new(),
    ];
    for reading in exceeded {
        match reading.timestamp.as_deref().filter(|t| !t.is_empty()) {
            Some(ts) => lines.push(format!(
                "• {}: {} lúc {}",
                reading.label,
                format_significant(reading.value),
                ts
            )),
            None => lines.push(format!("• {}: {}", reading.label, format_significant(reading.value))),
        }
    }
    Some(lines.join("\n"))
}

/// Sends one message listing every reading above `threshold`.
///
/// Returns `Ok(true)` if a message was sent, `Ok(false)` if nothing exceeded
/// the threshold or no transport is configured.
pub fn maybe_notify(
    readings: &[Reading],
    threshold: f64,
    transport: Option<&dyn AlertTransport>,
) -> Result<bool, HydroError> {
    let Some(transport) = transport else {
        debug!(target: LOG, "No alert transport configured; skipping threshold check");
        return Ok(false);
    };
    let Some(text) = compose_threshold_message(readings, threshold) else {
        return Ok(false);
    };

    transport.send(&text)?;
    info!(target: LOG, "Sent threshold alert (threshold {})", threshold);
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Outbox {
        sent: RefCell<Vec<String>>,
    }

    impl AlertTransport for Outbox {
        fn send(&self, text: &str) -> Result<(), HydroError> {
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn readings() -> Vec<Reading> {
        vec![
            Reading::new("A", 5000.0, Some("2024-10-28 14:00".into())),
            Reading::new("B", 3000.0, Some("2024-10-28 14:00".into())),
        ]
    }

    // --- Configuration ----------------------------------------------------------

    #[test]
    fn test_config_requires_token_and_chat_id() {
        assert_eq!(TelegramConfig::from_vars(vars(&[])).unwrap(), None);
        assert_eq!(
            TelegramConfig::from_vars(vars(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap(),
            None
        );
        assert_eq!(
            TelegramConfig::from_vars(vars(&[("TELEGRAM_BOT_TOKEN", "t"), ("TELEGRAM_CHAT_ID", "")]))
                .unwrap(),
            None,
            "empty chat id counts as missing"
        );
    }

    #[test]
    fn test_config_threshold_defaults_and_overrides() {
        let cfg = TelegramConfig::from_vars(vars(&[("TELEGRAM_BOT_TOKEN", "t"), ("TELEGRAM_CHAT_ID", "42")]))
            .unwrap()
            .unwrap();
        assert_eq!(cfg.threshold, DEFAULT_THRESHOLD);

        let cfg = TelegramConfig::from_vars(vars(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "42"),
            ("TELEGRAM_THRESHOLD", "4500.5"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(cfg.threshold, 4500.5);
    }

    #[test]
    fn test_config_rejects_non_numeric_threshold() {
        let err = TelegramConfig::from_vars(vars(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "42"),
            ("TELEGRAM_THRESHOLD", "high"),
        ]))
        .unwrap_err();
        assert!(matches!(err, HydroError::Config(_)));
    }

    #[test]
    fn test_endpoint_embeds_token() {
        let client = TelegramClient::with_client(
            reqwest::blocking::Client::new(),
            "https://api.telegram.org/",
            &TelegramConfig::new("123:abc", "42", 1.0),
        );
        assert_eq!(client.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    // --- Composition ------------------------------------------------------------

    #[test]
    fn test_message_lists_only_exceeding_readings() {
        let text = compose_threshold_message(&readings(), 4000.0).unwrap();
        assert!(text.starts_with("⚠️ <b>Cảnh báo lưu lượng</b>"));
        assert!(text.contains("Ngưỡng: 4000"));
        assert!(text.contains("• A: 5000 lúc 2024-10-28 14:00"));
        assert!(!text.contains("• B"), "B is below the threshold: {}", text);
    }

    #[test]
    fn test_reading_equal_to_threshold_is_not_exceeding() {
        assert_eq!(compose_threshold_message(&readings(), 5000.0), None);
    }

    #[test]
    fn test_reading_without_timestamp_omits_time() {
        let text = compose_threshold_message(&[Reading::new("Q về Vu Gia", 6100.5, None)], 6000.0).unwrap();
        assert!(text.ends_with("• Q về Vu Gia: 6100.5"));
    }

    #[test]
    fn test_message_numbers_keep_six_significant_digits() {
        let text = compose_threshold_message(
            &[Reading::new("Q về Thu Bồn", 6123.456789, Some("2024-10-28 14:00".to_string()))],
            6000.25,
        )
        .unwrap();
        assert!(text.contains("Ngưỡng: 6000.25"), "{}", text);
        assert!(text.contains("• Q về Thu Bồn: 6123.46 lúc 2024-10-28 14:00"), "{}", text);
    }

    #[test]
    fn test_format_significant() {
        assert_eq!(format_significant(5000.0), "5000");
        assert_eq!(format_significant(6100.5), "6100.5");
        assert_eq!(format_significant(1234.56789), "1234.57");
        assert_eq!(format_significant(0.25), "0.25");
        assert_eq!(format_significant(0.0001234), "0.0001234");
        assert_eq!(format_significant(0.0), "0");
        assert_eq!(format_significant(-42.5), "-42.5");
        assert_eq!(format_significant(1234567.0), "1.23457e+06");
        assert_eq!(format_significant(999999.7), "1e+06");
        assert_eq!(format_significant(0.00001234), "1.234e-05");
    }

    // --- maybe_notify -----------------------------------------------------------

    #[test]
    fn test_exactly_one_message_when_a_reading_exceeds() {
        let outbox = Outbox::default();
        assert!(maybe_notify(&readings(), 4000.0, Some(&outbox)).unwrap());
        let sent = outbox.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("• A: 5000"));
    }

    #[test]
    fn test_nothing_sent_below_threshold() {
        let outbox = Outbox::default();
        assert!(!maybe_notify(&readings(), 9000.0, Some(&outbox)).unwrap());
        assert!(outbox.sent.borrow().is_empty());
    }

    #[test]
    fn test_nothing_sent_without_transport() {
        assert!(!maybe_notify(&readings(), 0.0, None).unwrap());
    }
}
