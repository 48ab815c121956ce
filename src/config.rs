/// Runtime configuration.
///
/// Values are layered: built-in defaults, then environment variables (a
/// `.env` file in the working directory is loaded first), then an optional
/// TOML file, then command-line flags. Each layer only replaces what it
/// actually sets.
///
/// ```toml
/// [discharge]
/// plant_ids = "1,2,3,4"
/// output = "out/baocaothuydien_plot.png"
/// marked_dates = ["2020-10-28", "2022-10-15"]
///
/// [water_level]
/// station = "553300"
///
/// [cache]
/// dir = ".cache"
/// ttl_minutes = 30
///
/// [logging]
/// level = "debug"
/// file = "hydromon.log"
/// ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use log::LevelFilter;
use serde::Deserialize;

use crate::alert::telegram::TelegramConfig;
use crate::analysis::marked::parse_marked_dates;
use crate::cache::{CacheConfig, DEFAULT_CACHE_DIR, DEFAULT_TTL_MINUTES};
use crate::ingest::discharge::DISCHARGE_BASE_URL;
use crate::ingest::sheet::default_sheet_url;
use crate::model::HydroError;
use crate::stations::{normalize_plant_ids, DEFAULT_PLANT_IDS, DEFAULT_STATION_CODE};

pub const DEFAULT_DISCHARGE_OUTPUT: &str = "baocaothuydien_plot.png";
pub const DEFAULT_WATER_LEVEL_OUTPUT: &str = "tram_ainghia_plot.png";

pub const ENV_DEFAULT_START: &str = "BAOCAOTHUYDIEN_DEFAULT_START";
pub const ENV_DEFAULT_END: &str = "BAOCAOTHUYDIEN_DEFAULT_END";
pub const ENV_MARKED_DATES: &str = "MARKED_VALUE_BY_DATE";

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub discharge: DischargeSettings,
    pub water_level: WaterLevelSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DischargeSettings {
    pub base_url: String,
    pub plant_ids: String,
    /// `ngaybatdau`; `None` means yesterday 00:00 UTC.
    pub start: Option<String>,
    /// `ngayketthuc`; `None` means today 23:59:59 UTC.
    pub end: Option<String>,
    pub output: PathBuf,
    pub mobile_output: Option<PathBuf>,
    pub mobile_overlay_output: Option<PathBuf>,
    pub marked_dates: Vec<String>,
}

impl Default for DischargeSettings {
    fn default() -> Self {
        Self {
            base_url: DISCHARGE_BASE_URL.to_string(),
            plant_ids: DEFAULT_PLANT_IDS.to_string(),
            start: None,
            end: None,
            output: PathBuf::from(DEFAULT_DISCHARGE_OUTPUT),
            mobile_output: None,
            mobile_overlay_output: None,
            marked_dates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterLevelSettings {
    pub sheet_url: String,
    pub station: String,
    pub output: PathBuf,
    pub mobile_output: Option<PathBuf>,
}

impl Default for WaterLevelSettings {
    fn default() -> Self {
        Self {
            sheet_url: default_sheet_url(),
            station: DEFAULT_STATION_CODE.to_string(),
            output: PathBuf::from(DEFAULT_WATER_LEVEL_OUTPUT),
            mobile_output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub ttl_minutes: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> Result<CacheConfig, HydroError> {
        if self.ttl_minutes < 0 {
            return Err(HydroError::Config(format!(
                "cache TTL must not be negative (got {} minutes)",
                self.ttl_minutes
            )));
        }
        let ttl = Duration::try_minutes(self.ttl_minutes).ok_or_else(|| {
            HydroError::Config(format!("cache TTL of {} minutes is out of range", self.ttl_minutes))
        })?;
        Ok(CacheConfig::new(self.dir.clone(), ttl))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console_timestamps: true,
        }
    }
}

impl LoggingSettings {
    pub fn level_filter(&self) -> Result<LevelFilter, HydroError> {
        parse_level(&self.level)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads `.env` from the working directory if there is one.
pub fn load_dotenv() {
    dotenv::dotenv().ok();
}

impl AppConfig {
    /// Defaults plus environment, plus the TOML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, HydroError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| HydroError::io(path, e))?;
                Self::from_toml_str(&text)
                    .map_err(|e| HydroError::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, HydroError> {
        toml::from_str(text).map_err(|e| HydroError::Config(e.to_string()))
    }

    /// Fills discharge settings the file left unset from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = &mut self.discharge;
        if d.start.is_none() {
            d.start = non_empty(ENV_DEFAULT_START);
        }
        if d.end.is_none() {
            d.end = non_empty(ENV_DEFAULT_END);
        }
        if d.marked_dates.is_empty() {
            if let Some(raw) = non_empty(ENV_MARKED_DATES) {
                d.marked_dates = parse_marked_dates(&raw);
            }
        }
    }

    /// Checks the settings every subcommand uses.
    pub fn validate(&self) -> Result<(), HydroError> {
        self.logging.level_filter()?;
        Ok(())
    }

    /// Checks the discharge and cache settings, normalizing the plant id
    /// list in place.
    pub fn validate_discharge(&mut self) -> Result<(), HydroError> {
        self.discharge.plant_ids =
            normalize_plant_ids(&self.discharge.plant_ids).map_err(HydroError::Config)?;
        self.cache.cache_config()?;
        Ok(())
    }
}

pub fn parse_level(raw: &str) -> Result<LevelFilter, HydroError> {
    raw.trim()
        .parse::<LevelFilter>()
        .map_err(|_| HydroError::Config(format!("unknown log level '{}'", raw)))
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// Yesterday 00:00:00.000Z relative to `today`.
pub fn default_start(today: NaiveDate) -> String {
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    format!("{}T00:00:00.000Z", yesterday.format("%Y-%m-%d"))
}

/// Today 23:59:59.000Z.
pub fn default_end(today: NaiveDate) -> String {
    format!("{}T23:59:59.000Z", today.format("%Y-%m-%d"))
}

impl DischargeSettings {
    /// The query window, filling unset ends from the UTC date of `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (String, String) {
        let today = now.date_naive();
        (
            self.start.clone().unwrap_or_else(|| default_start(today)),
            self.end.clone().unwrap_or_else(|| default_end(today)),
        )
    }

    /// Mobile hourly and overlay paths, if a mobile hourly path is set.
    /// The overlay defaults to `<stem>_overlay<ext>` beside the hourly chart.
    pub fn mobile_paths(&self) -> Option<(PathBuf, PathBuf)> {
        let hourly = self.mobile_output.clone()?;
        let overlay = self
            .mobile_overlay_output
            .clone()
            .unwrap_or_else(|| overlay_path_for(&hourly));
        Some((hourly, overlay))
    }
}

/// `dir/name.png` → `dir/name_overlay.png`.
pub fn overlay_path_for(hourly: &Path) -> PathBuf {
    let stem = hourly
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match hourly.extension() {
        Some(ext) => format!("{}_overlay.{}", stem, ext.to_string_lossy()),
        None => format!("{}_overlay", stem),
    };
    hourly.with_file_name(name)
}

/// Telegram settings for the water-level alert.
///
/// Command-line credentials must come as a pair. Without them the bot
/// token and chat id are read from the environment. Either way the alert
/// threshold is `threshold` (the station's top rule level), never
/// `TELEGRAM_THRESHOLD`.
pub fn resolve_telegram_config<F>(
    token: Option<&str>,
    chat_id: Option<&str>,
    threshold: f64,
    lookup: F,
) -> Result<Option<TelegramConfig>, HydroError>
where
    F: Fn(&str) -> Option<String>,
{
    match (token, chat_id) {
        (Some(token), Some(chat_id)) => Ok(Some(TelegramConfig::new(token, chat_id, threshold))),
        (Some(_), None) | (None, Some(_)) => Err(HydroError::Config(
            "--telegram-token and --telegram-chat-id must be given together".to_string(),
        )),
        (None, None) => Ok(TelegramConfig::from_vars(lookup)?.map(|mut config| {
            config.threshold = threshold;
            config
        })),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
