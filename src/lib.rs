/// Hydrological report service for the Vu Gia – Thu Bồn river basin.
///
/// Pulls hydropower discharge reports and gauge water levels from public
/// endpoints, charts them, caches discharge runs on disk and sends Telegram
/// alerts when flows or levels cross their thresholds. Meant to be run once
/// per invocation by an external scheduler such as cron.

pub mod alert;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod stations;
