//! Exchange trading session calendar.

use time::macros::time;
use time::{Time, Weekday};

use crate::UtcDateTime;

/// Weekday session window in exchange time, both bounds inclusive.
///
/// Holidays are not modelled; any Monday to Friday is a trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    pub open: Time,
    pub close: Time,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self::nse()
    }
}

impl MarketHours {
    /// NSE cash session, 09:00 to 15:30 IST.
    pub const fn nse() -> Self {
        Self {
            open: time!(09:00),
            close: time!(15:30),
        }
    }

    pub fn is_trading_day(at: UtcDateTime) -> bool {
        !matches!(
            at.in_exchange_time().weekday(),
            Weekday::Saturday | Weekday::Sunday
        )
    }

    pub fn is_open(&self, at: UtcDateTime) -> bool {
        if !Self::is_trading_day(at) {
            return false;
        }
        let local = at.in_exchange_time().time();
        local >= self.open && local <= self.close
    }

    /// Session open on the exchange day containing `at`.
    pub fn session_open(&self, at: UtcDateTime) -> UtcDateTime {
        at.exchange_day_at(self.open)
    }
}
