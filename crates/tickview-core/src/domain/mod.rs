//! # Domain Models
//!
//! Canonical value types shared by the rendering, scheduling and valuation
//! pipelines.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bar`] | One validated OHLC(V) candle |
//! | [`Series`] | Time-ordered, immutable run of bars |
//! | [`DownsampledPoint`] | Bucket aggregate produced for display |
//! | [`RangeKey`] | Requested display window (LIVE, 1D, ... 1Y) |
//! | [`CandleInterval`] | Candle granularity for fetches |
//! | [`Position`] | Quantity held at an average cost |
//! | [`UtcDateTime`] | UTC instant |

mod bar;
mod interval;
mod position;
mod range;
mod timestamp;

pub use bar::{Bar, DownsampledPoint, Series};
pub use interval::CandleInterval;
pub use position::Position;
pub(crate) use position::validate_non_negative;
pub use range::RangeKey;
pub use timestamp::{UtcDateTime, EXCHANGE_OFFSET};
