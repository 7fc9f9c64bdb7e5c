//! Render state for one price chart.
//!
//! [`ChartView::build`] runs the display half of the pipeline over a
//! normalized series: range resolution, profile lookup, width-driven bar
//! budget, OHLC downsampling, bar sizing and trend styling.

use serde::{Deserialize, Serialize};

use crate::downsample::{bar_thickness, downsample};
use crate::profile::{effective_range, RangeProfile, ViewportClass};
use crate::trend::{Trend, TrendStyle};
use crate::{Bar, DownsampledPoint, RangeKey, UtcDateTime};

/// Display inputs supplied by the view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    /// Explicit range; inferred from the series span when absent.
    pub range: Option<RangeKey>,
    pub viewport: ViewportClass,
    /// Measured surface width in pixels, if known.
    pub width: Option<f64>,
}

impl ChartRequest {
    pub fn new(range: Option<RangeKey>, viewport: ViewportClass) -> Self {
        Self {
            range,
            viewport,
            width: None,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    fn resolved_width(&self) -> f64 {
        self.width
            .filter(|width| width.is_finite() && *width > 0.0)
            .unwrap_or_else(|| self.viewport.fallback_width())
    }
}

/// One close sample on the line chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinePoint {
    pub timestamp: UtcDateTime,
    pub value: f64,
}

/// Highlighted last point on live charts, colored like the line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveMarker {
    pub point: LinePoint,
    pub color: &'static str,
}

/// Window statistics shown under the chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartSummary {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: Option<f64>,
}

impl ChartSummary {
    pub fn of(bars: &[Bar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;

        let mut high = f64::NEG_INFINITY;
        let mut low = f64::INFINITY;
        let mut volume: Option<f64> = None;
        for bar in bars {
            high = high.max(bar.high);
            low = low.min(bar.low);
            if let Some(v) = bar.volume {
                volume = Some(volume.unwrap_or(0.0) + v);
            }
        }

        let change = last.close - first.open;
        let change_percent = if first.open != 0.0 {
            change / first.open * 100.0
        } else {
            0.0
        };

        Some(Self {
            open: first.open,
            high,
            low,
            close: last.close,
            change,
            change_percent,
            volume,
        })
    }
}

/// Everything a renderer needs to draw one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub range: RangeKey,
    pub profile: RangeProfile,
    pub width: f64,
    pub desired_bars: usize,
    pub candles: Vec<DownsampledPoint>,
    pub bar_thickness: u32,
    pub line: Vec<LinePoint>,
    pub line_samples: usize,
    pub style: TrendStyle,
    pub live_marker: Option<LiveMarker>,
    pub max_ticks: u32,
    pub summary: Option<ChartSummary>,
}

impl ChartView {
    pub fn build(bars: &[Bar], request: ChartRequest) -> Self {
        let range = effective_range(request.range, bars);
        let profile = RangeProfile::lookup(range, request.viewport);
        let width = request.resolved_width();

        let desired_bars = profile.desired_bars(width);
        // desired_bars >= profile.min_bars >= 1, so downsampling cannot fail
        let candles = downsample(bars, desired_bars).unwrap_or_default();
        let bar_thickness =
            bar_thickness(width, candles.len(), request.viewport.max_bar_thickness());

        let line: Vec<LinePoint> = bars
            .iter()
            .map(|bar| LinePoint {
                timestamp: bar.timestamp,
                value: bar.close,
            })
            .collect();

        let style = Trend::of_window(bars).style();
        let live_marker = if range.is_live() {
            line.last().map(|point| LiveMarker {
                point: *point,
                color: style.stroke,
            })
        } else {
            None
        };

        Self {
            range,
            profile,
            width,
            desired_bars,
            candles,
            bar_thickness,
            line_samples: profile.line_samples(width),
            line,
            style,
            live_marker,
            max_ticks: request.viewport.max_ticks(),
            summary: ChartSummary::of(bars),
        }
    }

    pub fn trend(&self) -> Trend {
        self.style.trend
    }
}
