use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::UtcDateTime;

/// One validated OHLC(V) candle.
///
/// `low <= min(open, close) <= max(open, close) <= high` is expected from
/// upstream but not enforced; only the timestamp and close are guaranteed finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(
        timestamp: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Flat candle where every price equals `close`.
    pub fn flat(timestamp: UtcDateTime, close: f64) -> Self {
        Self::new(timestamp, close, close, close, close, None)
    }
}

/// Time-ordered, immutable run of bars.
///
/// Construction sorts by timestamp (stable, ties keep input order) and drops
/// bars whose close is not finite, so every `Series` upholds both invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.retain(|bar| bar.close.is_finite());
        bars.sort_by_key(|bar| bar.timestamp);
        Self { bars }
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    /// Most recent `count` closes, oldest first.
    pub fn tail_closes(&self, count: usize) -> Vec<f64> {
        let start = self.bars.len().saturating_sub(count);
        self.bars[start..].iter().map(|bar| bar.close).collect()
    }
}

impl Deref for Series {
    type Target = [Bar];

    fn deref(&self) -> &Self::Target {
        &self.bars
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<Bar>::deserialize(deserializer).map(Self::from_bars)
    }
}

/// Aggregated candle emitted by the downsampler; volume is not carried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampledPoint {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<&Bar> for DownsampledPoint {
    fn from(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}
