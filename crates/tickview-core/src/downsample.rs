//! OHLC bucket aggregation and bar sizing.

use crate::{Bar, DownsampledPoint, ValidationError};

/// Reduces `bars` to at most `max_bars` points.
///
/// Short series pass through unchanged. Longer ones are cut into contiguous
/// buckets of `ceil(n / max_bars)` bars; each bucket keeps the first open, the
/// last close and timestamp, and the extreme high and low.
pub fn downsample(bars: &[Bar], max_bars: usize) -> Result<Vec<DownsampledPoint>, ValidationError> {
    if max_bars == 0 {
        return Err(ValidationError::ZeroMaxBars);
    }
    if bars.len() <= max_bars {
        return Ok(bars.iter().map(DownsampledPoint::from).collect());
    }

    let step = bars.len().div_ceil(max_bars);
    Ok(bars.chunks(step).filter_map(aggregate_bucket).collect())
}

fn aggregate_bucket(bucket: &[Bar]) -> Option<DownsampledPoint> {
    let first = bucket.first()?;
    let last = bucket.last()?;
    let (high, low) = bucket
        .iter()
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(high, low), bar| {
            (high.max(bar.high), low.min(bar.low))
        });

    Some(DownsampledPoint {
        timestamp: last.timestamp,
        open: first.open,
        high,
        low,
        close: last.close,
    })
}

/// Candle body width in pixels: `clamp(floor(width / count * 0.75), 1, max)`.
pub fn bar_thickness(width: f64, bar_count: usize, max_thickness: u32) -> u32 {
    let count = bar_count.max(1) as f64;
    let estimate = ((width / count) * 0.75).floor();
    let estimate = if estimate.is_finite() && estimate > 0.0 {
        estimate.min(f64::from(u32::MAX)) as u32
    } else {
        0
    };
    estimate.clamp(1, max_thickness.max(1))
}
