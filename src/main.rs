//! `hydromon` command-line entry point.
//!
//! ```text
//! hydromon discharge   [--start ..] [--end ..] [--plant-ids 1,2,3,4] [--output ..] ...
//! hydromon water-level [--ma-tram 553300] [--csv rows.csv] [--output ..] ...
//! ```
//!
//! Exit status is 0 on success, 1 when the run failed and 2 when the
//! configuration is invalid.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::info;

use hydromon_service::alert::telegram::{AlertTransport, TelegramClient, TelegramConfig};
use hydromon_service::cache::CacheManager;
use hydromon_service::config::{self, load_dotenv, resolve_telegram_config, AppConfig};
use hydromon_service::ingest::discharge::DischargeApi;
use hydromon_service::ingest::sheet::{LocalCsv, SheetExport};
use hydromon_service::ingest::{http_client, SheetSource, FETCH_TIMEOUT};
use hydromon_service::logging::{init_logger, log_failure, DataSource};
use hydromon_service::model::{HydroError, RequestParams};
use hydromon_service::pipeline::{
    run_discharge_report, run_water_level_report, AlertTarget, DischargeJob, WaterLevelJob,
};
use hydromon_service::render::PlottersRenderer;
use hydromon_service::stations::station_or_default;

const LOG: &str = DataSource::System.target();

#[derive(Parser, Debug)]
#[command(name = "hydromon")]
#[command(about = "Discharge and water-level reports for the Vu Gia – Thu Bồn basin")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "HYDROMON_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Append log lines to this file as well as the console
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the hydropower discharge report and plot Vu Gia / Thu Bồn flows
    Discharge(DischargeArgs),
    /// Plot gauge water levels from the shared sheet and alert on rising levels
    WaterLevel(WaterLevelArgs),
}

#[derive(Args, Debug)]
struct DischargeArgs {
    /// ngaybatdau query param (default: yesterday 00:00 UTC)
    #[arg(long)]
    start: Option<String>,

    /// ngayketthuc query param (default: today 23:59:59 UTC)
    #[arg(long)]
    end: Option<String>,

    /// Comma-separated lst_thuydien_id query param
    #[arg(long)]
    plant_ids: Option<String>,

    /// Path of the hourly chart; the overlay chart is written beside it
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path of the mobile hourly chart
    #[arg(long)]
    mobile_output: Option<PathBuf>,

    /// Path of the mobile overlay chart
    #[arg(long)]
    mobile_overlay_output: Option<PathBuf>,

    /// Open the charts after saving
    #[arg(long)]
    show: bool,

    /// Directory for cached payloads and charts
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Cache freshness window in minutes
    #[arg(long)]
    cache_ttl: Option<i64>,

    /// Bypass the cache and always call the API
    #[arg(long)]
    force_refresh: bool,
}

#[derive(Args, Debug)]
struct WaterLevelArgs {
    /// Sheet CSV export URL
    #[arg(long)]
    sheet_url: Option<String>,

    /// Local CSV file (skips the sheet download)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Station code to chart
    #[arg(long)]
    ma_tram: Option<String>,

    /// Path of the chart
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path of the mobile chart
    #[arg(long)]
    mobile_output: Option<PathBuf>,

    /// Open the chart after saving
    #[arg(long)]
    show: bool,

    /// Telegram bot token (default: TELEGRAM_BOT_TOKEN)
    #[arg(long)]
    telegram_token: Option<String>,

    /// Telegram chat id (default: TELEGRAM_CHAT_ID)
    #[arg(long)]
    telegram_chat_id: Option<String>,
}

fn main() -> ExitCode {
    // Before parsing, so `.env` can supply HYDROMON_CONFIG.
    load_dotenv();
    let cli = Cli::parse();

    let app = match load_config(&cli) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("hydromon: {}", e);
            return ExitCode::from(2);
        }
    };

    let level = config::parse_level(&app.logging.level).unwrap_or(log::LevelFilter::Info);
    init_logger(level, app.logging.file.as_deref(), app.logging.console_timestamps);
    info!(target: LOG, "{}", "-".repeat(80));

    let result = match &cli.command {
        Command::Discharge(args) => discharge(&app, args),
        Command::WaterLevel(args) => water_level(&app, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let source = match &cli.command {
                Command::Discharge(_) => DataSource::Discharge,
                Command::WaterLevel(_) => DataSource::Sheet,
            };
            log_failure(source, "report", &e);
            if matches!(e, HydroError::Config(_)) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// File and environment first, then flags.
fn load_config(cli: &Cli) -> Result<AppConfig, HydroError> {
    let mut app = AppConfig::load(cli.config.as_deref())?;

    if let Some(level) = &cli.log_level {
        app.logging.level = level.clone();
    }
    if let Some(file) = &cli.log_file {
        app.logging.file = Some(file.clone());
    }

    match &cli.command {
        Command::Discharge(args) => {
            let d = &mut app.discharge;
            override_with(&mut d.start, &args.start);
            override_with(&mut d.end, &args.end);
            if let Some(ids) = &args.plant_ids {
                d.plant_ids = ids.clone();
            }
            if let Some(output) = &args.output {
                d.output = output.clone();
            }
            override_with(&mut d.mobile_output, &args.mobile_output);
            override_with(&mut d.mobile_overlay_output, &args.mobile_overlay_output);
            if let Some(dir) = &args.cache_dir {
                app.cache.dir = dir.clone();
            }
            if let Some(ttl) = args.cache_ttl {
                app.cache.ttl_minutes = ttl;
            }
            app.validate_discharge()?;
        }
        Command::WaterLevel(args) => {
            let w = &mut app.water_level;
            if let Some(url) = &args.sheet_url {
                w.sheet_url = url.clone();
            }
            if let Some(station) = &args.ma_tram {
                w.station = station.clone();
            }
            if let Some(output) = &args.output {
                w.output = output.clone();
            }
            override_with(&mut w.mobile_output, &args.mobile_output);
        }
    }

    app.validate()?;
    Ok(app)
}

fn override_with<T: Clone>(slot: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        slot.clone_from(flag);
    }
}

fn discharge(app: &AppConfig, args: &DischargeArgs) -> Result<(), HydroError> {
    let settings = &app.discharge;
    let now = Utc::now();
    let (start, end) = settings.window(now);
    info!(target: LOG, "Window {} .. {} (plants {})", start, end, settings.plant_ids);

    let job = DischargeJob {
        params: RequestParams::new(start, end, settings.plant_ids.clone()),
        output: settings.output.clone(),
        mobile: settings.mobile_paths(),
        marked_dates: settings.marked_dates.clone(),
        show: args.show,
        force_refresh: args.force_refresh,
    };

    let source = DischargeApi::new(http_client(FETCH_TIMEOUT)?, settings.base_url.clone());
    let cache = CacheManager::new(app.cache.cache_config()?);

    let telegram = match TelegramConfig::from_env() {
        Ok(Some(cfg)) => Some((TelegramClient::new(&cfg)?, cfg.threshold)),
        Ok(None) => None,
        Err(e) => {
            log_failure(DataSource::Alert, "alert configuration", &e);
            None
        }
    };
    let alerts = telegram.as_ref().map(|(client, threshold)| AlertTarget {
        transport: client as &dyn AlertTransport,
        threshold: *threshold,
    });

    let summary = run_discharge_report(&job, &source, &PlottersRenderer::new(), &cache, alerts, now)?;
    info!(
        target: LOG,
        "Discharge report done: {} points, {}, charts at {} and {}",
        summary.points,
        if summary.from_cache { "from cache" } else { "fresh fetch" },
        summary.artifacts.hourly.display(),
        summary.artifacts.overlay.display()
    );
    Ok(())
}

fn water_level(app: &AppConfig, args: &WaterLevelArgs) -> Result<(), HydroError> {
    let settings = &app.water_level;
    let job = WaterLevelJob {
        station: settings.station.clone(),
        output: settings.output.clone(),
        mobile_output: settings.mobile_output.clone(),
        show: args.show,
    };

    let top_level = station_or_default(&job.station)
        .top_threshold()
        .map(|rule| rule.level)
        .unwrap_or(f64::INFINITY);
    let telegram = resolve_telegram_config(
        args.telegram_token.as_deref(),
        args.telegram_chat_id.as_deref(),
        top_level,
        |key| std::env::var(key).ok(),
    )?;
    let client = telegram.as_ref().map(TelegramClient::new).transpose()?;
    let transport = client.as_ref().map(|c| c as &dyn AlertTransport);

    let source: Box<dyn SheetSource> = match &args.csv {
        Some(path) => Box::new(LocalCsv::new(path)),
        None => Box::new(SheetExport::new(http_client(FETCH_TIMEOUT)?, settings.sheet_url.clone())),
    };

    let summary = run_water_level_report(&job, source.as_ref(), &PlottersRenderer::new(), transport)?;
    match summary.latest {
        Some((time, level)) => info!(
            target: LOG,
            "Water-level report done: {} points, latest {:.2} m at {}",
            summary.points, level, time
        ),
        None => info!(target: LOG, "Water-level report done: {} points", summary.points),
    }
    Ok(())
}
