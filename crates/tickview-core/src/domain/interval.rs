use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Candle granularity understood by the candle fetch contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "ONE_MINUTE")]
    OneMinute,
    #[serde(rename = "ONE_DAY")]
    OneDay,
}

impl CandleInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "ONE_MINUTE",
            Self::OneDay => "ONE_DAY",
        }
    }

    pub const fn is_intraday(self) -> bool {
        matches!(self, Self::OneMinute)
    }
}

impl Display for CandleInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONE_MINUTE" | "1M" => Ok(Self::OneMinute),
            "ONE_DAY" | "1D" => Ok(Self::OneDay),
            other => Err(ValidationError::InvalidInterval {
                value: other.to_owned(),
            }),
        }
    }
}
