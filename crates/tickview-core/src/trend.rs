//! Up/down classification of a rendered window.

use serde::{Deserialize, Serialize};

use crate::Bar;

/// Direction of a series over its visible window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Neutral,
}

impl Trend {
    /// `Up` when `current >= baseline`, `Down` below it, `Neutral` if either is not finite.
    pub fn classify(baseline: f64, current: f64) -> Self {
        if !baseline.is_finite() || !current.is_finite() {
            Self::Neutral
        } else if current >= baseline {
            Self::Up
        } else {
            Self::Down
        }
    }

    /// Compares the last bar's close against the first bar's open.
    pub fn of_window(bars: &[Bar]) -> Self {
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Self::classify(first.open, last.close),
            _ => Self::Neutral,
        }
    }

    /// Strict comparison used for sparklines: ties are neutral.
    pub fn of_sparkline(values: &[f64], baseline: Option<f64>) -> Self {
        let last = values.last().copied();
        let reference = baseline.or_else(|| values.first().copied());
        match (reference, last) {
            (Some(reference), Some(last)) if reference.is_finite() && last.is_finite() => {
                if last > reference {
                    Self::Up
                } else if last < reference {
                    Self::Down
                } else {
                    Self::Neutral
                }
            }
            _ => Self::Neutral,
        }
    }

    pub const fn style(self) -> TrendStyle {
        match self {
            Self::Up => TrendStyle {
                trend: self,
                stroke: "#10b981",
                fill: "rgba(16,185,129,0.15)",
            },
            Self::Down => TrendStyle {
                trend: self,
                stroke: "#ef4444",
                fill: "rgba(239,68,68,0.15)",
            },
            Self::Neutral => TrendStyle {
                trend: self,
                stroke: "#0ea5e9",
                fill: "rgba(14,165,233,0.15)",
            },
        }
    }
}

/// Colors derived from a single [`Trend`].
///
/// The line stroke and the live marker both read `stroke`, so they cannot diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendStyle {
    pub trend: Trend,
    pub stroke: &'static str,
    pub fill: &'static str,
}
