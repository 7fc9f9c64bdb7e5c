//! [`MarketSource`](crate::source::MarketSource) and
//! [`AccountSource`](crate::source::AccountSource) implementations.

mod http;
mod simulated;

pub use http::HttpMarketSource;
pub use simulated::SimulatedSource;
