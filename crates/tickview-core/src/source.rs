//! External data contracts and the traits adapters implement.
//!
//! # Endpoints
//!
//! | Trait | Method | Request | Response |
//! |-------|--------|---------|----------|
//! | [`MarketSource`] | `candles` | [`CandleRequest`] | [`CandleResponse`] |
//! | [`MarketSource`] | `market_health` | none | [`MarketHealth`] |
//! | [`MarketSource`] | `live_prices` | [`LivePriceRequest`] | [`LivePriceBatch`] |
//! | [`AccountSource`] | `portfolio` | none | [`PortfolioSnapshot`] |
//! | [`AccountSource`] | `deposit` | [`DepositRequest`] | [`PortfolioSnapshot`] |
//! | [`AccountSource`] | `submit_trade` | [`TradeRequest`] | [`TradeAck`] |

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::normalize::{normalize_series, LooseValue, RawCandle};
use crate::{CandleInterval, Position, RangeKey, Series, UtcDateTime, ValidationError};

/// Upper bound on distinct instruments in one live price batch.
pub const MAX_LIVE_BATCH: usize = 60;

/// Boxed future returned by every source method.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    /// Upstream refused a trade or deposit; the message is user-facing.
    Rejected,
    Decode,
    Internal,
}

/// Structured upstream failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Rejected,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Decode,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Rejected => "source.rejected",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // rejection reasons are shown to the user as-is
        if self.kind == SourceErrorKind::Rejected {
            return f.write_str(&self.message);
        }
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// Candle window for one instrument (symbol or exchange token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub instrument: String,
    pub interval: CandleInterval,
    pub from: UtcDateTime,
    pub to: UtcDateTime,
}

impl CandleRequest {
    pub fn new(
        instrument: impl Into<String>,
        interval: CandleInterval,
        from: UtcDateTime,
        to: UtcDateTime,
    ) -> Result<Self, SourceError> {
        let instrument = instrument.into();
        if instrument.trim().is_empty() {
            return Err(SourceError::invalid_request(
                "candle request must name an instrument",
            ));
        }
        if from > to {
            return Err(SourceError::invalid_request(format!(
                "candle window start {from} is after end {to}"
            )));
        }
        Ok(Self {
            instrument,
            interval,
            from,
            to,
        })
    }

    /// Fetch window and interval for a display range ending at `now`.
    pub fn for_range(
        instrument: impl Into<String>,
        range: RangeKey,
        now: UtcDateTime,
    ) -> Result<Self, SourceError> {
        let from = range.window_start(now).min(now);
        Self::new(instrument, range.interval(), from, now)
    }

    /// Daily closes over the trailing `days`.
    pub fn daily(instrument: impl Into<String>, days: i64, now: UtcDateTime) -> Result<Self, SourceError> {
        Self::new(instrument, CandleInterval::OneDay, now.minus_days(days), now)
    }
}

/// Raw candles as delivered upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleResponse {
    #[serde(default)]
    pub series: Vec<RawCandle>,
}

impl CandleResponse {
    pub fn normalized(&self) -> Series {
        normalize_series(&self.series)
    }
}

/// Market open signal reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHealth {
    /// Absent in the payload reads as closed.
    #[serde(default, alias = "marketOpen")]
    pub market_open: bool,
}

/// Batch of recent prices for many instruments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivePriceRequest {
    #[serde(rename = "tokens")]
    pub instrument_ids: Vec<String>,
    #[serde(rename = "minutes")]
    pub lookback_minutes: u32,
    pub include_series: bool,
    pub series_points: usize,
}

impl LivePriceRequest {
    /// Deduplicates ids keeping first-seen order and caps the batch at [`MAX_LIVE_BATCH`].
    pub fn new<I, S>(
        instrument_ids: I,
        lookback_minutes: u32,
        include_series: bool,
        series_points: usize,
    ) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let instrument_ids: Vec<String> = instrument_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !id.trim().is_empty() && seen.insert(id.clone()))
            .take(MAX_LIVE_BATCH)
            .collect();

        if instrument_ids.is_empty() {
            return Err(SourceError::invalid_request(
                "live price request must include at least one instrument",
            ));
        }
        if include_series && series_points == 0 {
            return Err(SourceError::invalid_request(
                "series points must be greater than zero",
            ));
        }

        Ok(Self {
            instrument_ids,
            lookback_minutes,
            include_series,
            series_points,
        })
    }
}

/// One `(timestamp, close)` sample in a live series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    #[serde(alias = "t")]
    pub timestamp: UtcDateTime,
    #[serde(alias = "c")]
    pub close: f64,
}

/// Wire form of a live point; the timestamp may be text or epoch millis.
#[derive(Deserialize)]
struct RawLivePoint {
    #[serde(alias = "t")]
    timestamp: LooseValue,
    #[serde(alias = "c")]
    close: LooseValue,
}

impl RawLivePoint {
    fn into_point(self) -> Option<LivePoint> {
        let close = self.close.to_f64();
        if !close.is_finite() {
            return None;
        }
        Some(LivePoint {
            timestamp: self.timestamp.to_timestamp()?,
            close,
        })
    }
}

/// Readable points of a live series; anything else is skipped.
fn lenient_live_series<'de, D>(deserializer: D) -> Result<Option<Vec<LivePoint>>, D::Error>
where
    D: Deserializer<'de>,
{
    let points = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(points)) => points,
        _ => return Ok(None),
    };
    let total = points.len();
    let kept: Vec<LivePoint> = points
        .into_iter()
        .filter_map(|point| serde_json::from_value::<RawLivePoint>(point).ok())
        .filter_map(RawLivePoint::into_point)
        .collect();
    if kept.len() < total {
        debug!(dropped = total - kept.len(), "dropped unreadable live points");
    }
    Ok(Some(kept))
}

/// Last price as a number or numeric text; anything else reads as absent.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let price = Option::<serde_json::Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value::<LooseValue>(value).ok())
        .map(|value| value.to_f64())
        .filter(|price| price.is_finite());
    Ok(price)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveQuote {
    #[serde(default, deserialize_with = "lenient_price")]
    pub last: Option<f64>,
    #[serde(default, deserialize_with = "lenient_live_series")]
    pub series: Option<Vec<LivePoint>>,
}

impl LiveQuote {
    pub fn finite_last(&self) -> Option<f64> {
        self.last.filter(|price| price.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LivePriceBatch {
    #[serde(default)]
    pub prices: HashMap<String, LiveQuote>,
}

impl LivePriceBatch {
    /// Finite last prices keyed by instrument id.
    pub fn last_prices(&self) -> HashMap<String, f64> {
        self.prices
            .iter()
            .filter_map(|(id, quote)| quote.finite_last().map(|price| (id.clone(), price)))
            .collect()
    }
}

/// Account state as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    #[serde(default)]
    pub cash: f64,
    #[serde(default, alias = "realizedPL")]
    pub realized_pl: f64,
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub updated_at: Option<UtcDateTime>,
}

impl PortfolioSnapshot {
    /// Positions with `instrument_id` filled from the map key, in key order.
    pub fn positions(&self) -> Vec<Position> {
        self.positions
            .iter()
            .map(|(id, position)| Position {
                instrument_id: id.clone(),
                ..position.clone()
            })
            .collect()
    }

    pub fn open_instrument_ids(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|(_, position)| position.is_open())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Cash deposit, validated against the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepositRequest {
    pub amount: f64,
}

impl DepositRequest {
    pub fn new(amount: f64, ceiling: f64) -> Result<Self, ValidationError> {
        if !amount.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "amount" });
        }
        if amount <= 0.0 {
            return Err(ValidationError::DepositNotPositive);
        }
        if amount >= ceiling {
            return Err(ValidationError::DepositAboveCeiling { amount, ceiling });
        }
        Ok(Self { amount })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl Display for TradeSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(ValidationError::InvalidSide {
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: u32,
}

impl TradeRequest {
    pub fn new(symbol: impl Into<String>, side: TradeSide, quantity: u32) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(ValidationError::EmptyInstrumentId);
        }
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        Ok(Self {
            symbol,
            side,
            quantity,
        })
    }
}

/// Execution acknowledgment for an accepted trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAck {
    pub symbol: String,
    #[serde(default)]
    pub token: String,
    pub side: TradeSide,
    pub quantity: u32,
    pub price: f64,
    pub amount: f64,
    #[serde(default)]
    pub realized_pl: f64,
    #[serde(default)]
    pub executed_at: Option<UtcDateTime>,
}

/// Market data contract consumed by charts, dashboards and live sessions.
///
/// Implementations must be `Send + Sync`; sessions share them across tasks.
pub trait MarketSource: Send + Sync {
    fn candles<'a>(&'a self, req: CandleRequest) -> SourceFuture<'a, CandleResponse>;

    /// Reports whether the exchange is open right now.
    fn market_health<'a>(&'a self) -> SourceFuture<'a, MarketHealth>;

    fn live_prices<'a>(&'a self, req: LivePriceRequest) -> SourceFuture<'a, LivePriceBatch>;
}

/// Account contract: portfolio reads, deposits and trades.
///
/// # Errors
///
/// Refusals come back as [`SourceErrorKind::Rejected`] and are never retried.
pub trait AccountSource: Send + Sync {
    fn portfolio<'a>(&'a self) -> SourceFuture<'a, PortfolioSnapshot>;

    fn deposit<'a>(&'a self, req: DepositRequest) -> SourceFuture<'a, PortfolioSnapshot>;

    fn submit_trade<'a>(&'a self, req: TradeRequest) -> SourceFuture<'a, TradeAck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_request_dedupes_and_caps() {
        let ids: Vec<String> = (0..80)
            .flat_map(|i| [format!("tok{i}"), format!("tok{i}")])
            .collect();
        let request = LivePriceRequest::new(ids, 15, true, 40).expect("valid");
        assert_eq!(request.instrument_ids.len(), MAX_LIVE_BATCH);
        assert_eq!(request.instrument_ids[0], "tok0");
        assert_eq!(request.instrument_ids[1], "tok1");
    }

    #[test]
    fn empty_live_request_is_invalid() {
        let error = LivePriceRequest::new(Vec::<String>::new(), 15, true, 40).expect_err("empty");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
        assert!(!error.retryable());
    }

    #[test]
    fn deposit_bounds() {
        assert!(DepositRequest::new(100.0, 1e9).is_ok());
        assert_eq!(
            DepositRequest::new(0.0, 1e9),
            Err(ValidationError::DepositNotPositive)
        );
        assert_eq!(
            DepositRequest::new(1e9, 1e9),
            Err(ValidationError::DepositAboveCeiling {
                amount: 1e9,
                ceiling: 1e9
            })
        );
        assert!(DepositRequest::new(f64::NAN, 1e9).is_err());
    }

    #[test]
    fn trade_request_rejects_zero_quantity() {
        assert_eq!(
            TradeRequest::new("INFY", TradeSide::Buy, 0),
            Err(ValidationError::ZeroQuantity)
        );
        assert_eq!("sell".parse::<TradeSide>(), Ok(TradeSide::Sell));
        assert!("HOLD".parse::<TradeSide>().is_err());
    }

    #[test]
    fn rejection_displays_verbatim() {
        let error = SourceError::rejected("Insufficient cash");
        assert_eq!(error.to_string(), "Insufficient cash");
        assert_eq!(error.code(), "source.rejected");
        assert!(!error.retryable());
    }

    #[test]
    fn portfolio_snapshot_reads_wire_shape() {
        let snapshot: PortfolioSnapshot = serde_json::from_str(
            r#"{
                "cash": 1000.5,
                "realized_pl": 12.0,
                "positions": {"2885": {"symbol": "RELIANCE", "quantity": 3, "avg_price": 2500.0}},
                "updated_at": "2024-03-01T10:00:00+05:30",
                "rev": 4
            }"#,
        )
        .expect("decodes");

        let positions = snapshot.positions();
        assert_eq!(positions[0].instrument_id, "2885");
        assert_eq!(positions[0].average_cost, 2500.0);
        assert_eq!(snapshot.open_instrument_ids(), vec![String::from("2885")]);
    }

    #[test]
    fn live_batch_keeps_only_finite_prices() {
        let batch: LivePriceBatch = serde_json::from_str(
            r#"{"ok": true, "prices": {
                "a": {"last": 10.5, "series": [{"t": "2024-03-01T10:00:00+05:30", "c": 10.5}]},
                "b": {"last": null, "series": []}
            }}"#,
        )
        .expect("decodes");

        let prices = batch.last_prices();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["a"], 10.5);
    }

    #[test]
    fn unreadable_live_points_are_skipped_without_losing_the_batch() {
        let batch: LivePriceBatch = serde_json::from_str(
            r#"{"prices": {
                "a": {"last": "101.5", "series": [
                    {"t": 1709610300000, "c": 101.0},
                    {"t": "2024-03-05T09:16:00+05:30", "c": "101.5"},
                    {"t": "soon", "c": 102.0},
                    {"t": 1709610420000, "c": false},
                    null
                ]},
                "b": {"last": true, "series": "pending"}
            }}"#,
        )
        .expect("decodes");

        let series = batch.prices["a"].series.as_deref().expect("series kept");
        let closes: Vec<f64> = series.iter().map(|point| point.close).collect();
        assert_eq!(closes, vec![101.0, 101.5]);
        assert_eq!(
            series[0].timestamp,
            UtcDateTime::from_unix_millis(1_709_610_300_000).expect("ts")
        );
        assert_eq!(batch.prices["b"], LiveQuote::default());
        assert_eq!(batch.last_prices(), HashMap::from([(String::from("a"), 101.5)]));
    }
}
