//! # Tickview Core
//!
//! Market-data pipeline behind the tickview charts, dashboard and portfolio.
//!
//! ## Overview
//!
//! - **Normalization** of loosely-typed upstream candles into ordered [`Series`]
//! - **Adaptive density**: range profiles, width-driven bar budgets and OHLC downsampling
//! - **Live scheduling**: a pure market-aware state machine driven by a tokio session
//! - **Batch fetches** for the leaderboard and sparklines
//! - **Portfolio valuation** with live-price fallback to daily closes
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | HTTP backend adapter and deterministic simulated source |
//! | [`batch`] | Concurrent fetches, leaderboard ranking, sparklines |
//! | [`chart`] | Render state for one chart |
//! | [`config`] | Environment-driven settings |
//! | [`domain`] | Bars, series, ranges, positions, timestamps |
//! | [`downsample`] | OHLC bucket aggregation and bar sizing |
//! | [`error`] | Validation and core errors |
//! | [`feeds`] | Live views for chart, leaderboard and portfolio |
//! | [`http_client`] | Transport abstraction |
//! | [`market_hours`] | Exchange session calendar |
//! | [`normalize`] | Raw candle decoding |
//! | [`preferences`] | Persisted follow-market preference |
//! | [`profile`] | Per-range density profiles |
//! | [`retry`] | Backoff and retry policy |
//! | [`scheduler`] | Live polling state machine |
//! | [`session`] | Async driver with stale-result suppression |
//! | [`source`] | Upstream contract and wire types |
//! | [`trend`] | Up/down classification and colors |
//! | [`valuation`] | Holdings P&L and summary |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickview_core::{ChartFeed, ChartRequest, LiveSession, SessionSettings, SimulatedSource, RangeKey};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(SimulatedSource::new());
//!     let feed = ChartFeed::new(source.clone(), "INFY", ChartRequest::default());
//!     let session = LiveSession::start(feed, source, SessionSettings::new(RangeKey::Live, true));
//!     let mut updates = session.subscribe();
//!     while updates.changed().await.is_ok() {
//!         if let Some(frame) = &updates.borrow().data {
//!             println!("{} bars", frame.view.candles.len());
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  commands  ┌────────────────┐  effects  ┌───────────────┐
//! │ CLI / caller  │───────────▶│  LiveSession   │◀─────────▶│ LiveScheduler │
//! └───────▲───────┘            └───────┬────────┘           └───────────────┘
//!         │ watch snapshots            │ load(range, silent)
//!         │                            ▼
//!         │                    ┌────────────────┐           ┌───────────────┐
//!         └────────────────────│ Chart/Portfolio│──────────▶│ MarketSource  │
//!                              │ LeaderboardFeed│           │ (HTTP / sim)  │
//!                              └────────────────┘           └───────────────┘
//! ```

pub mod adapters;
pub mod batch;
pub mod chart;
pub mod config;
pub mod domain;
pub mod downsample;
pub mod error;
pub mod feeds;
pub mod http_client;
pub mod market_hours;
pub mod normalize;
pub mod preferences;
pub mod profile;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod trend;
pub mod valuation;

pub use adapters::{HttpMarketSource, SimulatedSource};

pub use batch::{LeaderboardEntry, Sparkline};
pub use chart::{ChartRequest, ChartView};
pub use config::TickviewConfig;

pub use domain::{
    Bar, CandleInterval, DownsampledPoint, Position, RangeKey, Series, UtcDateTime,
    EXCHANGE_OFFSET,
};

pub use error::{CoreError, ValidationError};
pub use feeds::{ChartFeed, ChartFrame, LeaderboardFeed, PortfolioFeed, PortfolioFrame};
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use market_hours::MarketHours;
pub use preferences::{FilePreferenceStore, FollowMarketSetting, PreferenceStore, Preferences};
pub use profile::{RangeProfile, ViewportClass};
pub use retry::{Backoff, RetryPolicy};
pub use scheduler::{LiveScheduler, SchedulerEffect, SchedulerEvent, SchedulerState};
pub use session::{LiveSession, LiveView, LoadRequest, SessionSettings, SessionSnapshot};

pub use source::{
    AccountSource, CandleRequest, CandleResponse, DepositRequest, LivePriceBatch,
    LivePriceRequest, MarketHealth, MarketSource, PortfolioSnapshot, SourceError,
    SourceErrorKind, TradeAck, TradeRequest, TradeSide,
};

pub use trend::Trend;
pub use valuation::{valuate, HoldingSort, PortfolioSummary, SortDirection, Valuation, ValuationRow};
