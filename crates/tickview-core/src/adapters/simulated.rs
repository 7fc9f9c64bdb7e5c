use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use time::macros::time;
use time::Duration;

use crate::batch::compact_series;
use crate::market_hours::MarketHours;
use crate::normalize::RawCandle;
use crate::source::{
    AccountSource, CandleRequest, CandleResponse, DepositRequest, LivePoint, LivePriceBatch,
    LivePriceRequest, LiveQuote, MarketHealth, MarketSource, PortfolioSnapshot, SourceError,
    SourceFuture, TradeAck, TradeRequest, TradeSide,
};
use crate::{CandleInterval, Position, UtcDateTime};

/// Intraday windows longer than this are clipped to their most recent part.
const MAX_INTRADAY_DAYS: i64 = 10;

/// Deterministic offline market and account.
///
/// Prices are a pure function of the instrument and the minute, so repeated
/// fetches over overlapping windows agree. Used by the CLI's `--mock` mode
/// and by the behavior tests.
#[derive(Debug)]
pub struct SimulatedSource {
    hours: MarketHours,
    deposit_ceiling: f64,
    state: Mutex<SimulatedState>,
    candle_calls: AtomicUsize,
    health_calls: AtomicUsize,
    live_calls: AtomicUsize,
}

#[derive(Debug)]
struct SimulatedState {
    market_open: Option<bool>,
    failing: HashSet<String>,
    portfolio: PortfolioSnapshot,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            hours: MarketHours::default(),
            deposit_ceiling: 1_000_000_000.0,
            state: Mutex::new(SimulatedState {
                market_open: None,
                failing: HashSet::new(),
                portfolio: PortfolioSnapshot {
                    cash: 0.0,
                    realized_pl: 0.0,
                    positions: BTreeMap::new(),
                    updated_at: None,
                },
            }),
            candle_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            live_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_deposit_ceiling(mut self, ceiling: f64) -> Self {
        self.deposit_ceiling = ceiling;
        self
    }

    /// Seeds the account with cash and holdings keyed by instrument id.
    pub fn with_portfolio(self, cash: f64, positions: Vec<Position>) -> Self {
        {
            let mut state = self.lock();
            state.portfolio.cash = cash;
            state.portfolio.positions = positions
                .into_iter()
                .map(|position| (position.instrument_id.clone(), position))
                .collect();
            state.portfolio.updated_at = Some(UtcDateTime::now());
        }
        self
    }

    /// Forces the health signal; `None` follows the session calendar.
    pub fn set_market_open(&self, open: Option<bool>) {
        self.lock().market_open = open;
    }

    /// Makes candle fetches for `instrument` fail as unavailable.
    pub fn fail_instrument(&self, instrument: impl Into<String>) {
        self.lock().failing.insert(instrument.into());
    }

    pub fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }

    /// Simulated price of `instrument` at `at`.
    pub fn price_at(&self, instrument: &str, at: UtcDateTime) -> f64 {
        let seed = instrument_seed(instrument);
        let base = 90.0 + (seed % 510) as f64 / 10.0;
        let minute = at.unix_millis().div_euclid(60_000) as f64;
        let phase = (seed % 360) as f64;
        let swing = (minute / 97.0 + phase).sin() * 0.04 + (minute / 4_001.0 + phase).sin() * 0.08;
        round_paise(base * (1.0 + swing))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state
            .lock()
            .expect("simulated source state lock is not poisoned")
    }

    fn candle(&self, instrument: &str, at: UtcDateTime, step: Duration) -> RawCandle {
        let previous = UtcDateTime::from_offset_datetime(at.into_inner() - step);
        let open = self.price_at(instrument, previous);
        let close = self.price_at(instrument, at);
        let high = round_paise(open.max(close) * 1.002);
        let low = round_paise(open.min(close) * 0.998);
        let volume = 20_000 + instrument_seed(instrument) % 9_000 + (at.unix_millis() / 60_000) as u64 % 700;
        RawCandle::record(
            at.unix_millis() as f64,
            open,
            high,
            low,
            close,
            Some(volume as f64),
        )
    }

    fn series(&self, req: &CandleRequest) -> Vec<RawCandle> {
        match req.interval {
            CandleInterval::OneMinute => {
                let start = req.from.max(req.to.minus_days(MAX_INTRADAY_DAYS));
                let first_minute = start.unix_millis().div_euclid(60_000) * 60_000;
                let mut cursor = UtcDateTime::from_unix_millis(first_minute).unwrap_or(start);
                let mut records = Vec::new();
                while cursor <= req.to {
                    if self.hours.is_open(cursor) {
                        records.push(self.candle(&req.instrument, cursor, Duration::minutes(1)));
                    }
                    cursor = UtcDateTime::from_offset_datetime(cursor.into_inner() + Duration::minutes(1));
                }
                records
            }
            CandleInterval::OneDay => {
                let mut day = req.from.exchange_day_at(time!(15:30));
                let mut records = Vec::new();
                while day <= req.to {
                    if day >= req.from && MarketHours::is_trading_day(day) {
                        records.push(self.candle(&req.instrument, day, Duration::days(1)));
                    }
                    day = UtcDateTime::from_offset_datetime(day.into_inner() + Duration::days(1));
                }
                records
            }
        }
    }

    fn quote(&self, instrument: &str, req: &LivePriceRequest, now: UtcDateTime) -> LiveQuote {
        let series = req.include_series.then(|| {
            let minutes = i64::from(req.lookback_minutes.max(1));
            let points: Vec<LivePoint> = (0..minutes)
                .rev()
                .map(|back| now.minus_minutes(back))
                .map(|timestamp| LivePoint {
                    timestamp,
                    close: self.price_at(instrument, timestamp),
                })
                .collect();
            compact_series(&points, req.series_points)
        });
        LiveQuote {
            last: Some(self.price_at(instrument, now)),
            series,
        }
    }
}

impl MarketSource for SimulatedSource {
    fn candles<'a>(&'a self, req: CandleRequest) -> SourceFuture<'a, CandleResponse> {
        Box::pin(async move {
            self.candle_calls.fetch_add(1, Ordering::SeqCst);
            if self.lock().failing.contains(&req.instrument) {
                return Err(SourceError::unavailable(format!(
                    "no candles available for {}",
                    req.instrument
                )));
            }
            Ok(CandleResponse {
                series: self.series(&req),
            })
        })
    }

    fn market_health<'a>(&'a self) -> SourceFuture<'a, MarketHealth> {
        Box::pin(async move {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            let forced = self.lock().market_open;
            Ok(MarketHealth {
                market_open: forced.unwrap_or_else(|| self.hours.is_open(UtcDateTime::now())),
            })
        })
    }

    fn live_prices<'a>(&'a self, req: LivePriceRequest) -> SourceFuture<'a, LivePriceBatch> {
        Box::pin(async move {
            self.live_calls.fetch_add(1, Ordering::SeqCst);
            let now = UtcDateTime::now();
            let prices = req
                .instrument_ids
                .iter()
                .map(|id| (id.clone(), self.quote(id, &req, now)))
                .collect();
            Ok(LivePriceBatch { prices })
        })
    }
}

impl AccountSource for SimulatedSource {
    fn portfolio<'a>(&'a self) -> SourceFuture<'a, PortfolioSnapshot> {
        Box::pin(async move { Ok(self.lock().portfolio.clone()) })
    }

    fn deposit<'a>(&'a self, req: DepositRequest) -> SourceFuture<'a, PortfolioSnapshot> {
        Box::pin(async move {
            if !req.amount.is_finite() || req.amount <= 0.0 {
                return Err(SourceError::rejected("Deposit amount must be positive"));
            }
            if req.amount >= self.deposit_ceiling {
                return Err(SourceError::rejected("Deposit amount exceeds limit"));
            }
            let mut state = self.lock();
            state.portfolio.cash += req.amount;
            state.portfolio.updated_at = Some(UtcDateTime::now());
            Ok(state.portfolio.clone())
        })
    }

    fn submit_trade<'a>(&'a self, req: TradeRequest) -> SourceFuture<'a, TradeAck> {
        Box::pin(async move {
            let now = UtcDateTime::now();
            let price = self.price_at(&req.symbol, now);
            let quantity = f64::from(req.quantity);
            let amount = round_paise(price * quantity);

            let mut state = self.lock();
            let portfolio = &mut state.portfolio;
            let mut realized = 0.0;
            match req.side {
                TradeSide::Buy => {
                    if amount > portfolio.cash {
                        return Err(SourceError::rejected("Insufficient cash"));
                    }
                    portfolio.cash -= amount;
                    let position = portfolio
                        .positions
                        .entry(req.symbol.clone())
                        .or_insert_with(|| Position {
                            instrument_id: req.symbol.clone(),
                            symbol: req.symbol.clone(),
                            quantity: 0.0,
                            average_cost: 0.0,
                        });
                    let held = position.quantity;
                    position.average_cost =
                        (position.average_cost * held + amount) / (held + quantity);
                    position.quantity = held + quantity;
                }
                TradeSide::Sell => {
                    let Some(position) = portfolio.positions.get_mut(&req.symbol) else {
                        return Err(SourceError::rejected("Insufficient quantity"));
                    };
                    if position.quantity < quantity {
                        return Err(SourceError::rejected("Insufficient quantity"));
                    }
                    realized = round_paise((price - position.average_cost) * quantity);
                    position.quantity -= quantity;
                    if position.quantity == 0.0 {
                        portfolio.positions.remove(&req.symbol);
                    }
                    portfolio.cash += amount;
                    portfolio.realized_pl += realized;
                }
            }
            portfolio.updated_at = Some(now);

            Ok(TradeAck {
                symbol: req.symbol.clone(),
                token: req.symbol,
                side: req.side,
                quantity: req.quantity,
                price,
                amount,
                realized_pl: realized,
                executed_at: Some(now),
            })
        })
    }
}

fn instrument_seed(instrument: &str) -> u64 {
    instrument
        .bytes()
        .fold(13_u64, |acc, byte| acc.wrapping_mul(29).wrapping_add(u64::from(byte)))
}

fn round_paise(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorKind;

    fn at(value: &str) -> UtcDateTime {
        UtcDateTime::parse(value).expect("timestamp")
    }

    #[tokio::test]
    async fn intraday_candles_stay_inside_the_session() {
        let source = SimulatedSource::new();
        // Monday 2024-03-04, 08:00 to 10:00 IST
        let req = CandleRequest::new(
            "INFY",
            CandleInterval::OneMinute,
            at("2024-03-04T08:00:00+05:30"),
            at("2024-03-04T10:00:00+05:30"),
        )
        .expect("valid");

        let series = source.candles(req).await.expect("candles").normalized();

        assert_eq!(series.len(), 61);
        assert_eq!(series.as_slice()[0].timestamp, at("2024-03-04T09:00:00+05:30"));
        assert_eq!(source.candle_calls(), 1);
    }

    #[tokio::test]
    async fn daily_candles_skip_weekends() {
        let source = SimulatedSource::new();
        let req = CandleRequest::new(
            "TCS",
            CandleInterval::OneDay,
            at("2024-03-01T00:00:00+05:30"),
            at("2024-03-08T23:00:00+05:30"),
        )
        .expect("valid");

        let series = source.candles(req).await.expect("candles").normalized();
        assert_eq!(series.len(), 6);
    }

    #[tokio::test]
    async fn prices_are_deterministic_per_instrument() {
        let source = SimulatedSource::new();
        let instant = at("2024-03-04T11:15:00+05:30");
        assert_eq!(source.price_at("INFY", instant), source.price_at("INFY", instant));
        assert_ne!(source.price_at("INFY", instant), source.price_at("TCS", instant));
    }

    #[tokio::test]
    async fn failing_instruments_report_unavailable() {
        let source = SimulatedSource::new();
        source.fail_instrument("BAD");
        let now = UtcDateTime::now();
        let error = source
            .candles(CandleRequest::daily("BAD", 5, now).expect("valid"))
            .await
            .expect_err("forced failure");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn forced_market_state_overrides_the_calendar() {
        let source = SimulatedSource::new();
        source.set_market_open(Some(true));
        assert!(source.market_health().await.expect("health").market_open);
        source.set_market_open(Some(false));
        assert!(!source.market_health().await.expect("health").market_open);
        assert_eq!(source.health_calls(), 2);
    }

    #[tokio::test]
    async fn buying_without_cash_is_rejected_verbatim() {
        let source = SimulatedSource::new();
        let trade = TradeRequest::new("INFY", TradeSide::Buy, 1).expect("valid");
        let error = source.submit_trade(trade).await.expect_err("no cash");
        assert_eq!(error.to_string(), "Insufficient cash");
    }

    #[tokio::test]
    async fn buy_then_sell_round_trips_cash_and_realizes_nothing_at_same_price() {
        let source = SimulatedSource::new().with_portfolio(100_000.0, Vec::new());
        let buy = source
            .submit_trade(TradeRequest::new("INFY", TradeSide::Buy, 10).expect("valid"))
            .await
            .expect("bought");
        let after_buy = source.portfolio().await.expect("portfolio");
        assert_eq!(after_buy.positions["INFY"].quantity, 10.0);
        assert!((after_buy.cash - (100_000.0 - buy.amount)).abs() < 1e-6);

        let oversell = TradeRequest::new("INFY", TradeSide::Sell, 11).expect("valid");
        assert_eq!(
            source.submit_trade(oversell).await.expect_err("too many").kind(),
            SourceErrorKind::Rejected
        );
    }

    #[tokio::test]
    async fn deposits_at_or_above_the_ceiling_are_rejected() {
        let source = SimulatedSource::new().with_deposit_ceiling(1_000.0);
        let error = source
            .deposit(DepositRequest { amount: 1_000.0 })
            .await
            .expect_err("ceiling");
        assert_eq!(error.to_string(), "Deposit amount exceeds limit");

        let snapshot = source
            .deposit(DepositRequest { amount: 250.0 })
            .await
            .expect("deposit");
        assert_eq!(snapshot.cash, 250.0);
    }

    #[tokio::test]
    async fn live_series_hold_one_point_per_lookback_minute() {
        let source = SimulatedSource::new();
        let req = LivePriceRequest::new(["INFY", "TCS"], 15, true, 40).expect("valid");
        let batch = source.live_prices(req).await.expect("quotes");

        assert_eq!(batch.prices.len(), 2);
        let series = batch.prices["INFY"].series.as_ref().expect("series");
        assert_eq!(series.len(), 15);
        assert!(series.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(source.live_calls(), 1);
    }

    #[tokio::test]
    async fn long_live_series_are_compacted_keeping_the_latest_point() {
        let source = SimulatedSource::new();
        let req = LivePriceRequest::new(["INFY"], 120, true, 40).expect("valid");
        let batch = source.live_prices(req).await.expect("quotes");

        let quote = &batch.prices["INFY"];
        let series = quote.series.as_ref().expect("series");
        // stride 3 over 120 minutes, plus the final minute
        assert_eq!(series.len(), 41);
        assert_eq!(series.last().map(|point| point.close), quote.last);
    }
}
