//! Runtime settings with environment overrides.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ValidationError;

pub const ENV_BASE_URL: &str = "TICKVIEW_BASE_URL";
pub const ENV_POLL_MS: &str = "TICKVIEW_POLL_MS";
pub const ENV_HEALTH_MS: &str = "TICKVIEW_HEALTH_MS";
pub const ENV_PORTFOLIO_POLL_MS: &str = "TICKVIEW_PORTFOLIO_POLL_MS";
pub const ENV_DEPOSIT_CEILING: &str = "TICKVIEW_DEPOSIT_CEILING";
pub const ENV_TIMEOUT_MS: &str = "TICKVIEW_TIMEOUT_MS";
pub const ENV_PREFERENCES: &str = "TICKVIEW_PREFERENCES";

/// Settings shared by sessions, adapters and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct TickviewConfig {
    pub base_url: String,
    /// Silent refresh cadence while a live chart is polling.
    pub price_poll: Duration,
    /// Market health re-check cadence.
    pub health_poll: Duration,
    /// Live price cadence on the portfolio view.
    pub portfolio_poll: Duration,
    pub live_lookback_minutes: u32,
    pub sparkline_points: usize,
    pub daily_lookback_days: i64,
    pub leaderboard_size: usize,
    pub deposit_ceiling: f64,
    pub request_timeout: Duration,
    pub preferences_path: PathBuf,
}

impl Default for TickviewConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:8000"),
            price_poll: Duration::from_secs(10),
            health_poll: Duration::from_secs(60),
            portfolio_poll: Duration::from_secs(5),
            live_lookback_minutes: 15,
            sparkline_points: 40,
            daily_lookback_days: 60,
            leaderboard_size: 5,
            deposit_ceiling: 1e9,
            request_timeout: Duration::from_secs(3),
            preferences_path: PathBuf::from("tickview-preferences.json"),
        }
    }
}

impl TickviewConfig {
    /// Defaults overlaid with `TICKVIEW_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; unparseable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_owned();
        }
        if let Some(value) = lookup(ENV_POLL_MS) {
            config.price_poll = parse_millis(ENV_POLL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_HEALTH_MS) {
            config.health_poll = parse_millis(ENV_HEALTH_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_PORTFOLIO_POLL_MS) {
            config.portfolio_poll = parse_millis(ENV_PORTFOLIO_POLL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.request_timeout = parse_millis(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_DEPOSIT_CEILING) {
            let ceiling: f64 = parse_setting(ENV_DEPOSIT_CEILING, &value)?;
            if !ceiling.is_finite() || ceiling <= 0.0 {
                return Err(invalid(ENV_DEPOSIT_CEILING, &value));
            }
            config.deposit_ceiling = ceiling;
        }
        if let Some(path) = lookup(ENV_PREFERENCES).filter(|value| !value.trim().is_empty()) {
            config.preferences_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn parse_setting<T: FromStr>(key: &'static str, value: &str) -> Result<T, ValidationError> {
    value.trim().parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ValidationError> {
    match parse_setting::<u64>(key, value)? {
        0 => Err(invalid(key, value)),
        millis => Ok(Duration::from_millis(millis)),
    }
}

fn invalid(key: &'static str, value: &str) -> ValidationError {
    ValidationError::InvalidSetting {
        key,
        value: value.to_owned(),
    }
}
