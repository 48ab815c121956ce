/// Data organization utilities for the river monitoring service.
///
/// This module turns raw upstream records into chartable series. It does
/// no I/O of its own except for the marked-date maxima, which are remembered
/// beside the response cache.
///
/// Submodules:
/// - `series` — record cleaning policies and time-series extraction.
/// - `overlay` — per-day buckets for hour-of-day overlay charts.
/// - `marked` — daily peak flows of operator-selected reference dates.

pub mod marked;
pub mod overlay;
pub mod series;
