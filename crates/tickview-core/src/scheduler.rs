//! Live update policy as a pure state machine.
//!
//! [`LiveScheduler::handle`] consumes one [`SchedulerEvent`] and returns the
//! [`SchedulerEffect`]s the runtime must perform, in order. It owns no timers
//! and performs no I/O; [`crate::session`] maps effects onto tokio timers and
//! tasks.
//!
//! | Condition | Phase |
//! |-----------|-------|
//! | market open and range LIVE | `Polling` |
//! | market closed, or range not LIVE | `Idle` |
//!
//! With follow-market enabled, a close observed while LIVE is selected moves
//! the range to `1D`; the next open moves it back to LIVE. Picking a range by
//! hand suspends that fallback until the market is next seen open.

use serde::Serialize;
use tracing::info;

use crate::RangeKey;

/// Range used when the market closes under a followed LIVE view.
pub const CLOSED_MARKET_RANGE: RangeKey = RangeKey::OneDay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Polling,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub market_open: bool,
    pub polling_active: bool,
    pub selected_range: RangeKey,
    pub follow_market: bool,
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The owning view was mounted.
    Started,
    /// The user picked a range.
    RangeSelected(RangeKey),
    /// Result of a health check; failures arrive as `open: false`.
    MarketObserved { open: bool },
    FollowMarketChanged(bool),
    PriceTick,
    HealthTick,
    /// The owning view was torn down.
    Stopped,
}

/// Why the scheduler changed the range on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeChangeReason {
    MarketClosed,
    MarketOpened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEffect {
    /// Load data for `range`. Silent fetches do not toggle loading state.
    Fetch { range: RangeKey, silent: bool },
    CheckHealth,
    StartPricePolling,
    StopPricePolling,
    /// The selected range changed without user input.
    RangeChanged {
        range: RangeKey,
        reason: RangeChangeReason,
    },
    /// Cancel every timer and in-flight task.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct LiveScheduler {
    range: RangeKey,
    follow_market: bool,
    market_open: bool,
    market_observed: bool,
    polling: bool,
    stopped: bool,
    /// A close may trigger the automatic fallback.
    fallback_armed: bool,
    /// The current range was chosen by the fallback, not the user.
    resume_live_on_open: bool,
}

impl LiveScheduler {
    pub fn new(range: RangeKey, follow_market: bool) -> Self {
        Self {
            range,
            follow_market,
            market_open: false,
            market_observed: false,
            polling: false,
            stopped: false,
            fallback_armed: true,
            resume_live_on_open: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            market_open: self.market_open,
            polling_active: self.polling,
            selected_range: self.range,
            follow_market: self.follow_market,
            stopped: self.stopped,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        if self.polling {
            SchedulerPhase::Polling
        } else {
            SchedulerPhase::Idle
        }
    }

    pub fn handle(&mut self, event: SchedulerEvent) -> Vec<SchedulerEffect> {
        if self.stopped {
            return Vec::new();
        }

        let mut effects = Vec::new();
        match event {
            SchedulerEvent::Started => {
                effects.push(SchedulerEffect::Fetch {
                    range: self.range,
                    silent: false,
                });
                effects.push(SchedulerEffect::CheckHealth);
            }
            SchedulerEvent::RangeSelected(range) => {
                self.range = range;
                self.fallback_armed = false;
                self.resume_live_on_open = false;
                self.stop_polling(&mut effects);
                effects.push(SchedulerEffect::Fetch {
                    range,
                    silent: false,
                });
                effects.push(SchedulerEffect::CheckHealth);
            }
            SchedulerEvent::MarketObserved { open } => {
                if self.market_observed && self.market_open != open {
                    info!(open, range = %self.range, "market state changed");
                }
                self.market_open = open;
                self.market_observed = true;
                self.apply_market_policy(&mut effects);
            }
            SchedulerEvent::FollowMarketChanged(enabled) => {
                self.follow_market = enabled;
                if !enabled {
                    self.resume_live_on_open = false;
                }
                if self.market_observed {
                    self.apply_market_policy(&mut effects);
                }
            }
            SchedulerEvent::PriceTick => {
                if self.polling {
                    effects.push(SchedulerEffect::Fetch {
                        range: self.range,
                        silent: true,
                    });
                }
            }
            SchedulerEvent::HealthTick => effects.push(SchedulerEffect::CheckHealth),
            SchedulerEvent::Stopped => {
                self.stop_polling(&mut effects);
                self.stopped = true;
                effects.push(SchedulerEffect::Shutdown);
            }
        }
        effects
    }

    fn apply_market_policy(&mut self, effects: &mut Vec<SchedulerEffect>) {
        if self.market_open {
            self.fallback_armed = true;
            if self.follow_market && self.resume_live_on_open && !self.range.is_live() {
                self.resume_live_on_open = false;
                self.switch_range(RangeKey::Live, RangeChangeReason::MarketOpened, effects);
            }
        } else if self.follow_market && self.fallback_armed && self.range.is_live() {
            self.resume_live_on_open = true;
            self.stop_polling(effects);
            self.switch_range(CLOSED_MARKET_RANGE, RangeChangeReason::MarketClosed, effects);
        }

        if self.market_open && self.range.is_live() {
            if !self.polling {
                self.polling = true;
                info!(range = %self.range, "live polling started");
                effects.push(SchedulerEffect::StartPricePolling);
            }
        } else {
            self.stop_polling(effects);
        }
    }

    fn switch_range(
        &mut self,
        range: RangeKey,
        reason: RangeChangeReason,
        effects: &mut Vec<SchedulerEffect>,
    ) {
        info!(from = %self.range, to = %range, ?reason, "range changed by market policy");
        self.range = range;
        effects.push(SchedulerEffect::RangeChanged { range, reason });
        effects.push(SchedulerEffect::Fetch {
            range,
            silent: false,
        });
    }

    fn stop_polling(&mut self, effects: &mut Vec<SchedulerEffect>) {
        if self.polling {
            self.polling = false;
            info!(range = %self.range, "live polling stopped");
            effects.push(SchedulerEffect::StopPricePolling);
        }
    }
}
