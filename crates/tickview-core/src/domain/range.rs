use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::macros::time;

use crate::{CandleInterval, UtcDateTime, ValidationError};

/// Display window requested by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeKey {
    #[serde(rename = "LIVE")]
    Live,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl RangeKey {
    pub const ALL: [Self; 7] = [
        Self::Live,
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
        }
    }

    /// Only the live range is eligible for polling.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }

    pub const fn lookback_days(self) -> i64 {
        match self {
            Self::Live | Self::OneDay => 1,
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
        }
    }

    pub const fn interval(self) -> CandleInterval {
        match self {
            Self::Live => CandleInterval::OneMinute,
            _ => CandleInterval::OneDay,
        }
    }

    /// Start of the fetch window ending at `now`.
    ///
    /// The live range starts at the session open (09:00 exchange time) of the current day.
    pub fn window_start(self, now: UtcDateTime) -> UtcDateTime {
        match self {
            Self::Live => now.exchange_day_at(time!(09:00)),
            other => now.minus_days(other.lookback_days()),
        }
    }
}

impl Display for RangeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|range| range.as_str() == normalized)
            .ok_or(ValidationError::InvalidRange { value: normalized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(RangeKey::from_str("live").expect("must parse"), RangeKey::Live);
        assert_eq!(RangeKey::from_str("6m").expect("must parse"), RangeKey::SixMonths);
        assert!(matches!(
            RangeKey::from_str("2Y"),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn live_window_starts_at_session_open() {
        let now = UtcDateTime::parse("2024-03-04T08:00:00Z").expect("timestamp");
        let start = RangeKey::Live.window_start(now);
        assert_eq!(start.format_rfc3339(), "2024-03-04T03:30:00Z");
        assert_eq!(RangeKey::Live.interval(), CandleInterval::OneMinute);
    }

    #[test]
    fn historical_windows_use_daily_candles() {
        let now = UtcDateTime::parse("2024-03-31T00:00:00Z").expect("timestamp");
        let start = RangeKey::OneMonth.window_start(now);
        assert_eq!(start.format_rfc3339(), "2024-03-01T00:00:00Z");
        assert_eq!(RangeKey::OneYear.interval(), CandleInterval::OneDay);
    }
}
