//! Concurrent multi-instrument fetches and the views derived from them.
//!
//! Every fan-out here joins all members before deriving aggregate state, and a
//! failing member degrades to an empty contribution instead of failing the batch.

use std::collections::HashMap;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::source::{CandleRequest, LiveQuote, MarketSource, SourceError};
use crate::trend::Trend;
use crate::{Bar, RangeKey, Series, UtcDateTime};

/// Fetches and normalizes one series per instrument, concurrently.
///
/// Results keep the input order.
pub async fn fetch_series_batch(
    source: &dyn MarketSource,
    instruments: &[String],
    range: RangeKey,
    now: UtcDateTime,
) -> Vec<(String, Result<Series, SourceError>)> {
    let requests = instruments.iter().map(|instrument| async move {
        let result = match CandleRequest::for_range(instrument.as_str(), range, now) {
            Ok(request) => source
                .candles(request)
                .await
                .map(|response| response.normalized()),
            Err(error) => Err(error),
        };
        (instrument.clone(), result)
    });
    join_all(requests).await
}

/// Trailing daily closes per instrument. Failed members map to an empty series.
pub async fn fetch_daily_closes(
    source: &dyn MarketSource,
    instruments: &[String],
    days: i64,
    now: UtcDateTime,
) -> HashMap<String, Series> {
    let requests = instruments.iter().map(|instrument| async move {
        let result = match CandleRequest::daily(instrument.as_str(), days, now) {
            Ok(request) => source.candles(request).await.map(|response| response.normalized()),
            Err(error) => Err(error),
        };
        let series = result.unwrap_or_else(|error| {
            warn!(instrument = %instrument, %error, "daily close fetch failed");
            Series::empty()
        });
        (instrument.clone(), series)
    });
    join_all(requests).await.into_iter().collect()
}

/// Close-to-close return over the window, `0.0` when undefined.
pub fn period_return(bars: &[Bar]) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) if first.close > 0.0 => last.close / first.close - 1.0,
        _ => 0.0,
    }
}

/// One ranked dashboard card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub symbol: String,
    pub return_ratio: f64,
    pub trend: Trend,
    pub series: Series,
}

/// Ranks members by return, best first, keeping the top `size`.
///
/// Failed members score `-inf` with an empty series; empty members never rank.
pub fn rank_leaderboard(
    members: Vec<(String, Result<Series, SourceError>)>,
    size: usize,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = members
        .into_iter()
        .map(|(symbol, result)| {
            let (series, return_ratio) = match result {
                Ok(series) => {
                    let ratio = period_return(&series);
                    (series, ratio)
                }
                Err(error) => {
                    warn!(symbol = %symbol, %error, "leaderboard member failed");
                    (Series::empty(), f64::NEG_INFINITY)
                }
            };
            LeaderboardEntry {
                trend: Trend::of_window(&series),
                symbol,
                return_ratio,
                series,
            }
        })
        .filter(|entry| !entry.series.is_empty())
        .collect();

    entries.sort_by(|a, b| b.return_ratio.total_cmp(&a.return_ratio));
    entries.truncate(size);
    entries
}

pub async fn leaderboard(
    source: &dyn MarketSource,
    symbols: &[String],
    range: RangeKey,
    size: usize,
    now: UtcDateTime,
) -> Vec<LeaderboardEntry> {
    let members = fetch_series_batch(source, symbols, range, now).await;
    rank_leaderboard(members, size)
}

/// Samples every `max(1, n / max_points)`-th item and always keeps the last one.
pub fn compact_series<T: Clone>(points: &[T], max_points: usize) -> Vec<T> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let stride = (points.len() / max_points.max(1)).max(1);
    let mut compacted: Vec<T> = points.iter().step_by(stride).cloned().collect();
    if (points.len() - 1) % stride != 0 {
        if let Some(last) = points.last() {
            compacted.push(last.clone());
        }
    }
    compacted
}

/// Small close-only trend line for a holding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sparkline {
    pub values: Vec<f64>,
    pub trend: Trend,
}

impl Sparkline {
    /// Seeds from the last `points` daily closes; a live series with at least
    /// two finite points replaces the seed.
    pub fn build(daily: Option<&Series>, live: Option<&LiveQuote>, points: usize) -> Self {
        let live_values: Vec<f64> = live
            .and_then(|quote| quote.series.as_deref())
            .map(|series| {
                series
                    .iter()
                    .map(|point| point.close)
                    .filter(|close| close.is_finite())
                    .collect()
            })
            .unwrap_or_default();

        let values = if live_values.len() >= 2 {
            let start = live_values.len().saturating_sub(points);
            live_values[start..].to_vec()
        } else {
            daily
                .map(|series| series.tail_closes(points))
                .unwrap_or_default()
        };

        Self {
            trend: Trend::of_sparkline(&values, None),
            values,
        }
    }
}

/// Sparklines for every instrument in `instruments`.
pub fn sparklines(
    instruments: &[String],
    daily: &HashMap<String, Series>,
    live: Option<&HashMap<String, LiveQuote>>,
    points: usize,
) -> HashMap<String, Sparkline> {
    instruments
        .iter()
        .map(|id| {
            let quote = live.and_then(|quotes| quotes.get(id));
            (id.clone(), Sparkline::build(daily.get(id), quote, points))
        })
        .collect()
}
