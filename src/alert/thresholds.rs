//! Flood stage threshold checking.
//!
//! Rules are ordered ascending by severity (`BĐ1` < `BĐ2` < `BĐ3`), so the
//! last rule a level exceeds is the current stage.

use chrono::NaiveDateTime;

use crate::model::ThresholdRule;

/// Flood severity levels, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FloodSeverity {
    /// Alarm level 1.
    Watch,
    /// Alarm level 2.
    Warning,
    /// Alarm level 3 and above.
    Emergency,
}

impl FloodSeverity {
    /// Maps the position of a rule in an ascending rule list to a severity.
    /// Anything past the third rule is still an emergency.
    pub fn from_rank(rank: usize) -> Self {
        match rank {
            0 => FloodSeverity::Watch,
            1 => FloodSeverity::Warning,
            _ => FloodSeverity::Emergency,
        }
    }
}

/// Current stage of a gauge: the highest rule its level exceeds.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodStage {
    pub severity: FloodSeverity,
    pub rule: ThresholdRule,
}

/// A rising-edge alert ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodAlert {
    pub severity: FloodSeverity,
    pub message: String,
}

/// Returns the highest rule strictly exceeded by `level`, or `None` if the
/// level is at or below the first rule.
pub fn check_flood_stage(level: f64, rules: &[ThresholdRule]) -> Option<FloodStage> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| level > rule.level)
        .last()
        .map(|(rank, rule)| FloodStage {
            severity: FloodSeverity::from_rank(rank),
            rule: *rule,
        })
}

/// Fires when the latest reading is above the top rule AND strictly above
/// the reading before it. Plateaus and falling levels stay quiet so repeated
/// runs during a long flood do not repeat the alert.
pub fn check_rising_edge(
    timeline: &[NaiveDateTime],
    values: &[f64],
    station: &str,
    rules: &[ThresholdRule],
) -> Option<FloodAlert> {
    let top = rules.last()?;
    let [.., prev_value, last_value] = values else {
        return None;
    };
    let [.., prev_time, last_time] = timeline else {
        return None;
    };

    if *last_value <= top.level || last_value <= prev_value {
        return None;
    }

    let message = [
        format!(
            "⚠️ Mực nước trạm {} đạt {:.2} m lúc {}",
            station,
            last_value,
            last_time.format("%Y-%m-%d %H:%M")
        ),
        format!("• Vượt {} ({:.2} m)", top.label, top.level),
        format!(
            "• Tiếp tục tăng từ {:.2} m lúc {}",
            prev_value,
            prev_time.format("%Y-%m-%d %H:%M")
        ),
    ]
    .join("\n");

    Some(FloodAlert {
        severity: FloodSeverity::from_rank(rules.len() - 1),
        message,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
