//! Portfolio valuation over daily closes with optional live prices.
//!
//! A [`Valuation`] is always produced whole: rows and summary come from the
//! same inputs in one pass, and callers replace the previous value rather
//! than patching fields of it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Position, Series};

/// Prices resolved for one instrument before applying quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBaseline {
    pub last_close: f64,
    pub prev_close: f64,
    /// No daily close was available; both closes are the average cost.
    pub cold_start: bool,
}

impl PriceBaseline {
    /// Last two daily closes; missing history falls back to the average cost.
    pub fn resolve(daily: Option<&Series>, average_cost: f64) -> Self {
        let closes = daily.map(|series| series.as_slice()).unwrap_or_default();
        let last_close = closes.last().map_or(average_cost, |bar| bar.close);
        let prev_close = if closes.len() >= 2 {
            closes[closes.len() - 2].close
        } else {
            last_close
        };
        Self {
            last_close,
            prev_close,
            cold_start: closes.is_empty(),
        }
    }
}

/// Derived figures for one open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationRow {
    pub instrument_id: String,
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub invested: f64,
    pub baseline: PriceBaseline,
    /// Live price when one was supplied, else the last daily close.
    pub price: f64,
    pub is_live: bool,
    pub current: f64,
    pub day_reference: f64,
    pub day_absolute: f64,
    pub day_percent: f64,
    pub total_absolute: f64,
    pub total_percent: f64,
}

/// Portfolio-wide totals.
///
/// Percentages are recomputed from the summed absolutes, never averaged per row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub current: f64,
    pub invested: f64,
    pub day_reference: f64,
    pub day_absolute: f64,
    pub day_percent: f64,
    pub total_absolute: f64,
    pub total_percent: f64,
}

/// Rows plus summary, computed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    pub rows: Vec<ValuationRow>,
    pub summary: PortfolioSummary,
}

impl Valuation {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Values every position with quantity above zero.
pub fn valuate(
    positions: &[Position],
    daily_closes: &HashMap<String, Series>,
    live_prices: Option<&HashMap<String, f64>>,
) -> Valuation {
    let rows: Vec<ValuationRow> = positions
        .iter()
        .filter(|position| position.is_open())
        .map(|position| {
            let baseline = PriceBaseline::resolve(
                daily_closes.get(&position.instrument_id),
                position.average_cost,
            );
            let live = live_prices
                .and_then(|prices| prices.get(&position.instrument_id))
                .copied()
                .filter(|price| price.is_finite());
            value_row(position, baseline, live)
        })
        .collect();

    let summary = summarize(&rows);
    Valuation { rows, summary }
}

fn value_row(position: &Position, baseline: PriceBaseline, live: Option<f64>) -> ValuationRow {
    let price = live.unwrap_or(baseline.last_close);
    let invested = position.invested();
    let current = position.quantity * price;
    // without any session history there is no day move to report
    let day_reference = if baseline.cold_start {
        current
    } else {
        position.quantity * baseline.prev_close
    };
    let day_absolute = current - day_reference;
    let total_absolute = current - invested;

    ValuationRow {
        instrument_id: position.instrument_id.clone(),
        symbol: position.symbol.clone(),
        quantity: position.quantity,
        average_cost: position.average_cost,
        invested,
        baseline,
        price,
        is_live: live.is_some(),
        current,
        day_reference,
        day_absolute,
        day_percent: percent_of(day_absolute, day_reference),
        total_absolute,
        total_percent: percent_of(total_absolute, invested),
    }
}

fn summarize(rows: &[ValuationRow]) -> PortfolioSummary {
    let (current, invested, day_reference) = rows.iter().fold(
        (0.0, 0.0, 0.0),
        |(current, invested, day_reference), row| {
            (
                current + row.current,
                invested + row.invested,
                day_reference + row.day_reference,
            )
        },
    );
    let day_absolute = current - day_reference;
    let total_absolute = current - invested;

    PortfolioSummary {
        current,
        invested,
        day_reference,
        day_absolute,
        day_percent: percent_of(day_absolute, day_reference),
        total_absolute,
        total_percent: percent_of(total_absolute, invested),
    }
}

fn percent_of(amount: f64, base: f64) -> f64 {
    if base == 0.0 || !base.is_finite() {
        return 0.0;
    }
    amount / base * 100.0
}

/// Column used to order holding rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingSort {
    #[default]
    Value,
    Day,
    Total,
    Symbol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Orders rows in place; equal keys keep their relative order.
pub fn sort_rows(rows: &mut [ValuationRow], by: HoldingSort, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ordering = match by {
            HoldingSort::Value => a.current.total_cmp(&b.current),
            HoldingSort::Day => a.day_absolute.total_cmp(&b.day_absolute),
            HoldingSort::Total => a.total_absolute.total_cmp(&b.total_absolute),
            HoldingSort::Symbol => a.symbol.cmp(&b.symbol),
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}
