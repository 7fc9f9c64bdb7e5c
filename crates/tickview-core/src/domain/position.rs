use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Holding of one instrument at a volume-weighted average cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub instrument_id: String,
    pub symbol: String,
    pub quantity: f64,
    #[serde(alias = "avg_price")]
    pub average_cost: f64,
}

impl Position {
    pub fn new(
        instrument_id: impl Into<String>,
        symbol: impl Into<String>,
        quantity: f64,
        average_cost: f64,
    ) -> Result<Self, ValidationError> {
        let instrument_id = instrument_id.into();
        if instrument_id.trim().is_empty() {
            return Err(ValidationError::EmptyInstrumentId);
        }
        validate_non_negative("quantity", quantity)?;
        validate_non_negative("average_cost", average_cost)?;

        Ok(Self {
            instrument_id,
            symbol: symbol.into(),
            quantity,
            average_cost,
        })
    }

    pub fn invested(&self) -> f64 {
        self.quantity * self.average_cost
    }

    pub fn is_open(&self) -> bool {
        self.quantity > 0.0
    }
}

pub(crate) fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
