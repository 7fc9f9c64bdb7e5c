use thiserror::Error;

use crate::source::SourceError;

/// Validation and contract errors exposed by `tickview-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid range '{value}', expected one of LIVE, 1D, 1W, 1M, 3M, 6M, 1Y")]
    InvalidRange { value: String },
    #[error("invalid interval '{value}', expected ONE_MINUTE or ONE_DAY")]
    InvalidInterval { value: String },
    #[error("invalid trade side '{value}', expected BUY or SELL")]
    InvalidSide { value: String },

    #[error("unrecognized timestamp: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("instrument id cannot be empty")]
    EmptyInstrumentId,
    #[error("max bars must be at least 1")]
    ZeroMaxBars,

    #[error("deposit amount must be positive")]
    DepositNotPositive,
    #[error("deposit amount {amount} must be below {ceiling}")]
    DepositAboveCeiling { amount: f64, ceiling: f64 },
    #[error("trade quantity must be greater than zero")]
    ZeroQuantity,

    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
