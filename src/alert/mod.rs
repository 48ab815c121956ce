/// Alerting.
///
/// Submodules:
/// - `thresholds` — severity classification and the rising-edge water-level rule.
/// - `telegram` — message composition and delivery through the Telegram Bot API.
///
/// Delivery is fire-and-forget from the pipeline's point of view: a failed
/// send is logged by the caller and never fails the run.

pub mod telegram;
pub mod thresholds;
