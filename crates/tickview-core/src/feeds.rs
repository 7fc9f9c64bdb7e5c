//! [`LiveView`] implementations for the stock chart, dashboard and portfolio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};

use crate::batch::{fetch_daily_closes, leaderboard, sparklines, LeaderboardEntry, Sparkline};
use crate::chart::{ChartRequest, ChartView};
use crate::config::TickviewConfig;
use crate::session::{LiveView, LoadRequest};
use crate::source::{
    AccountSource, CandleRequest, LivePriceRequest, LiveQuote, MarketSource, PortfolioSnapshot,
    SourceFuture,
};
use crate::valuation::{valuate, Valuation};
use crate::{Series, UtcDateTime};

/// Candles for one instrument, rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub instrument: String,
    pub series: Series,
    pub view: ChartView,
}

/// Single-instrument chart view.
pub struct ChartFeed {
    source: Arc<dyn MarketSource>,
    instrument: String,
    display: ChartRequest,
}

impl ChartFeed {
    pub fn new(source: Arc<dyn MarketSource>, instrument: impl Into<String>, display: ChartRequest) -> Self {
        Self {
            source,
            instrument: instrument.into(),
            display,
        }
    }
}

impl LiveView for ChartFeed {
    type Output = ChartFrame;

    fn load<'a>(&'a self, request: LoadRequest) -> SourceFuture<'a, ChartFrame> {
        Box::pin(async move {
            let candles =
                CandleRequest::for_range(self.instrument.as_str(), request.range, UtcDateTime::now())?;
            let series = self.source.candles(candles).await?.normalized();
            let view = ChartView::build(
                &series,
                ChartRequest {
                    range: Some(request.range),
                    ..self.display
                },
            );
            Ok(ChartFrame {
                instrument: self.instrument.clone(),
                series,
                view,
            })
        })
    }
}

/// Curated-symbol dashboard ranked by period return.
pub struct LeaderboardFeed {
    source: Arc<dyn MarketSource>,
    symbols: Vec<String>,
    size: usize,
}

impl LeaderboardFeed {
    pub fn new(source: Arc<dyn MarketSource>, symbols: Vec<String>, size: usize) -> Self {
        Self {
            source,
            symbols,
            size,
        }
    }
}

impl LiveView for LeaderboardFeed {
    type Output = Vec<LeaderboardEntry>;

    fn load<'a>(&'a self, request: LoadRequest) -> SourceFuture<'a, Vec<LeaderboardEntry>> {
        Box::pin(async move {
            Ok(leaderboard(
                self.source.as_ref(),
                &self.symbols,
                request.range,
                self.size,
                UtcDateTime::now(),
            )
            .await)
        })
    }
}

/// Valued holdings with their sparklines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioFrame {
    pub snapshot: PortfolioSnapshot,
    pub valuation: Valuation,
    pub sparklines: HashMap<String, Sparkline>,
}

#[derive(Debug, Clone)]
struct PortfolioBaseline {
    snapshot: PortfolioSnapshot,
    daily_closes: HashMap<String, Series>,
}

/// Portfolio valuation refreshed with live prices.
///
/// A full load reads the account and daily closes; silent refreshes reuse
/// that baseline and only pull live prices. Overlapping full loads keep the
/// baseline of the one started last, whatever order they finish in.
pub struct PortfolioFeed {
    market: Arc<dyn MarketSource>,
    account: Arc<dyn AccountSource>,
    daily_lookback_days: i64,
    live_lookback_minutes: u32,
    sparkline_points: usize,
    full_loads: AtomicU64,
    baseline: Mutex<Option<(u64, PortfolioBaseline)>>,
}

impl PortfolioFeed {
    pub fn new(
        market: Arc<dyn MarketSource>,
        account: Arc<dyn AccountSource>,
        config: &TickviewConfig,
    ) -> Self {
        Self {
            market,
            account,
            daily_lookback_days: config.daily_lookback_days,
            live_lookback_minutes: config.live_lookback_minutes,
            sparkline_points: config.sparkline_points,
            full_loads: AtomicU64::new(0),
            baseline: Mutex::new(None),
        }
    }

    async fn load_baseline(&self) -> Result<PortfolioBaseline, crate::source::SourceError> {
        let snapshot = self.account.portfolio().await?;
        let daily_closes = fetch_daily_closes(
            self.market.as_ref(),
            &snapshot.open_instrument_ids(),
            self.daily_lookback_days,
            UtcDateTime::now(),
        )
        .await;
        Ok(PortfolioBaseline {
            snapshot,
            daily_closes,
        })
    }

    async fn live_quotes(&self, instruments: &[String]) -> Option<HashMap<String, LiveQuote>> {
        if instruments.is_empty() {
            return None;
        }
        let request = match LivePriceRequest::new(
            instruments.iter().cloned(),
            self.live_lookback_minutes,
            true,
            self.sparkline_points,
        ) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "skipping live price refresh");
                return None;
            }
        };
        match self.market.live_prices(request).await {
            Ok(batch) => Some(batch.prices),
            Err(error) => {
                warn!(%error, "live price refresh failed, valuing at daily closes");
                None
            }
        }
    }

    fn cached_baseline(&self) -> Option<PortfolioBaseline> {
        self.baseline
            .lock()
            .expect("portfolio baseline lock is not poisoned")
            .as_ref()
            .map(|(_, baseline)| baseline.clone())
    }

    /// Caches `baseline` unless a later-started full load already stored one.
    fn store_baseline(&self, sequence: u64, baseline: &PortfolioBaseline) {
        let mut cached = self
            .baseline
            .lock()
            .expect("portfolio baseline lock is not poisoned");
        match cached.as_ref() {
            Some((stored, _)) if *stored > sequence => {
                debug!(sequence, stored, "keeping baseline of a newer full load");
            }
            _ => *cached = Some((sequence, baseline.clone())),
        }
    }
}

impl LiveView for PortfolioFeed {
    type Output = PortfolioFrame;

    fn load<'a>(&'a self, request: LoadRequest) -> SourceFuture<'a, PortfolioFrame> {
        Box::pin(async move {
            let baseline = match self.cached_baseline() {
                Some(baseline) if request.silent => baseline,
                _ => {
                    let sequence = self.full_loads.fetch_add(1, Ordering::SeqCst) + 1;
                    let fresh = self.load_baseline().await?;
                    self.store_baseline(sequence, &fresh);
                    fresh
                }
            };

            let instruments = baseline.snapshot.open_instrument_ids();
            let quotes = self.live_quotes(&instruments).await;
            let live_prices: Option<HashMap<String, f64>> = quotes.as_ref().map(|quotes| {
                quotes
                    .iter()
                    .filter_map(|(id, quote)| quote.finite_last().map(|price| (id.clone(), price)))
                    .collect()
            });

            let valuation = valuate(
                &baseline.snapshot.positions(),
                &baseline.daily_closes,
                live_prices.as_ref(),
            );
            let sparklines = sparklines(
                &instruments,
                &baseline.daily_closes,
                quotes.as_ref(),
                self.sparkline_points,
            );

            Ok(PortfolioFrame {
                snapshot: baseline.snapshot,
                valuation,
                sparklines,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, SimulatedSource};

    fn baseline(cash: f64) -> PortfolioBaseline {
        PortfolioBaseline {
            snapshot: PortfolioSnapshot {
                cash,
                realized_pl: 0.0,
                positions: Default::default(),
                updated_at: None,
            },
            daily_closes: HashMap::new(),
        }
    }

    fn feed() -> PortfolioFeed {
        let source = Arc::new(SimulatedSource::new().with_portfolio(
            500.0,
            vec![Position::new("INFY", "INFY", 1.0, 1_000.0).expect("valid")],
        ));
        PortfolioFeed::new(source.clone(), source, &TickviewConfig::default())
    }

    #[test]
    fn late_finishing_older_load_keeps_the_newer_baseline() {
        let feed = feed();
        feed.store_baseline(2, &baseline(200.0));
        feed.store_baseline(1, &baseline(100.0));
        assert_eq!(feed.cached_baseline().map(|cached| cached.snapshot.cash), Some(200.0));

        feed.store_baseline(3, &baseline(300.0));
        assert_eq!(feed.cached_baseline().map(|cached| cached.snapshot.cash), Some(300.0));
    }

    #[tokio::test]
    async fn full_loads_refresh_the_cached_baseline() {
        let feed = feed();
        let load = |silent| LoadRequest {
            range: crate::RangeKey::Live,
            silent,
        };

        let first = feed.load(load(false)).await.expect("full load");
        let silent = feed.load(load(true)).await.expect("silent refresh");
        feed.load(load(false)).await.expect("second full load");

        assert_eq!(first.snapshot, silent.snapshot);
        assert_eq!(feed.full_loads.load(Ordering::SeqCst), 2);
        assert!(feed.cached_baseline().is_some());
    }
}
