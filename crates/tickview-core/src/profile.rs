//! Range-dependent rendering parameters.

use serde::{Deserialize, Serialize};

use crate::{Bar, RangeKey};

/// Axis tick granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
}

/// Size class of the drawing surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportClass {
    #[default]
    Regular,
    Compact,
}

impl ViewportClass {
    pub const fn from_compact(compact: bool) -> Self {
        if compact {
            Self::Compact
        } else {
            Self::Regular
        }
    }

    pub const fn is_compact(self) -> bool {
        matches!(self, Self::Compact)
    }

    /// Width assumed before the surface has been measured.
    pub const fn fallback_width(self) -> f64 {
        match self {
            Self::Regular => 1000.0,
            Self::Compact => 520.0,
        }
    }

    pub const fn max_bar_thickness(self) -> u32 {
        match self {
            Self::Regular => 12,
            Self::Compact => 6,
        }
    }

    pub const fn max_ticks(self) -> u32 {
        match self {
            Self::Regular => 10,
            Self::Compact => 5,
        }
    }
}

/// Rendering parameters for one (range, viewport) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeProfile {
    pub bucket_unit: TimeUnit,
    pub tooltip_format: &'static str,
    pub px_per_bar: u32,
    pub min_bars: usize,
    pub max_bars: usize,
    pub line_smoothing: f64,
}

impl RangeProfile {
    pub fn lookup(range: RangeKey, viewport: ViewportClass) -> Self {
        let compact = viewport.is_compact();
        let pick = |small: usize, large: usize| if compact { small } else { large };

        let (bucket_unit, tooltip_format, min_bars, max_bars, line_smoothing) = match range {
            RangeKey::Live => (TimeUnit::Hour, "HH:mm", pick(60, 90), pick(220, 320), 0.15),
            RangeKey::OneDay | RangeKey::OneWeek => {
                (TimeUnit::Day, "MMM d", pick(60, 90), pick(200, 280), 0.15)
            }
            RangeKey::OneMonth => (TimeUnit::Week, "MMM d", pick(60, 90), pick(200, 260), 0.15),
            RangeKey::ThreeMonths => (TimeUnit::Day, "MMM d", pick(60, 90), pick(200, 260), 0.15),
            RangeKey::SixMonths => {
                (TimeUnit::Month, "MMM yyyy", pick(50, 80), pick(160, 220), 0.15)
            }
            RangeKey::OneYear => (TimeUnit::Month, "MMM yyyy", pick(45, 70), pick(140, 200), 0.05),
        };

        Self {
            bucket_unit,
            tooltip_format,
            px_per_bar: 10,
            min_bars,
            max_bars,
            line_smoothing,
        }
    }

    /// Bars the viewport can hold: `clamp(floor(width / pxPerBar), minBars, maxBars)`.
    pub fn desired_bars(&self, width: f64) -> usize {
        let estimate = (width / f64::from(self.px_per_bar)).floor();
        let estimate = if estimate.is_finite() && estimate > 0.0 {
            estimate as usize
        } else {
            0
        };
        estimate.clamp(self.min_bars, self.max_bars)
    }

    /// Sample budget for line decimation, 1.5x the bar estimate within bounds.
    pub fn line_samples(&self, width: f64) -> usize {
        let estimate = (width / f64::from(self.px_per_bar)).floor() * 1.5;
        let estimate = if estimate.is_finite() && estimate > 0.0 {
            estimate as usize
        } else {
            0
        };
        estimate.clamp(self.min_bars, self.max_bars)
    }
}

/// Guesses the range from the span between first and last bar.
pub fn infer_range(bars: &[Bar]) -> RangeKey {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return RangeKey::OneMonth;
    };
    let span_days = last.timestamp.days_since(first.timestamp);

    if span_days <= 2.0 {
        RangeKey::Live
    } else if span_days <= 10.0 {
        RangeKey::OneWeek
    } else if span_days <= 45.0 {
        RangeKey::OneMonth
    } else if span_days <= 220.0 {
        RangeKey::SixMonths
    } else {
        RangeKey::OneYear
    }
}

/// Explicit range when given, otherwise the one inferred from the bars.
pub fn effective_range(range: Option<RangeKey>, bars: &[Bar]) -> RangeKey {
    range.unwrap_or_else(|| infer_range(bars))
}
