//! Behavior-driven tests for portfolio valuation
//!
//! These tests verify how holdings are priced from daily closes and live
//! quotes, how the summary aggregates, and how the portfolio feed degrades.

use std::collections::HashMap;
use std::sync::Arc;

use tickview_core::valuation::sort_rows;
use tickview_core::{
    valuate, Bar, HoldingSort, LiveView, LoadRequest, PortfolioFeed, Position, RangeKey, Series,
    SimulatedSource, SortDirection, TickviewConfig, UtcDateTime,
};

fn position(id: &str, quantity: f64, average_cost: f64) -> Position {
    Position::new(id, id, quantity, average_cost).expect("valid position")
}

fn daily(closes: &[f64]) -> Series {
    Series::from_bars(
        closes
            .iter()
            .enumerate()
            .map(|(day, close)| {
                let millis = 1_709_000_000_000 + day as i64 * 86_400_000;
                Bar::flat(UtcDateTime::from_unix_millis(millis).expect("ts"), *close)
            })
            .collect(),
    )
}

// =============================================================================
// Row valuation
// =============================================================================

#[test]
fn when_no_daily_close_exists_yet_cost_stands_in_and_day_move_is_zero() {
    // Given: 10 shares at 50 with no history and a live price of 55
    let positions = [position("A", 10.0, 50.0)];
    let live = HashMap::from([(String::from("A"), 55.0)]);

    // When
    let valuation = valuate(&positions, &HashMap::new(), Some(&live));

    // Then
    let row = &valuation.rows[0];
    assert_eq!(row.current, 550.0);
    assert_eq!(row.invested, 500.0);
    assert_eq!(row.total_absolute, 50.0);
    assert_eq!(row.total_percent, 10.0);
    assert_eq!(row.day_absolute, 0.0);
    assert_eq!(row.day_percent, 0.0);
    assert!(row.baseline.cold_start);
    assert!(row.is_live);
}

#[test]
fn when_live_prices_are_missing_the_last_daily_close_is_used() {
    // Given: two closes and no live batch
    let positions = [position("A", 4.0, 90.0)];
    let closes = HashMap::from([(String::from("A"), daily(&[95.0, 100.0]))]);

    // When
    let valuation = valuate(&positions, &closes, None);

    // Then: priced at 100, day move measured against 95
    let row = &valuation.rows[0];
    assert_eq!(row.price, 100.0);
    assert!(!row.is_live);
    assert_eq!(row.day_reference, 380.0);
    assert_eq!(row.day_absolute, 20.0);
    assert_eq!(row.total_absolute, 40.0);
}

#[test]
fn when_a_live_price_is_not_finite_it_is_ignored() {
    // Given: a NaN quote
    let positions = [position("A", 1.0, 10.0)];
    let closes = HashMap::from([(String::from("A"), daily(&[11.0, 12.0]))]);
    let live = HashMap::from([(String::from("A"), f64::NAN)]);

    // When / Then
    let row = &valuate(&positions, &closes, Some(&live)).rows[0];
    assert_eq!(row.price, 12.0);
    assert!(!row.is_live);
}

#[test]
fn when_a_position_is_closed_it_is_not_valued() {
    let positions = [position("A", 0.0, 10.0), position("B", 2.0, 10.0)];
    let valuation = valuate(&positions, &HashMap::new(), None);
    assert_eq!(valuation.rows.len(), 1);
    assert_eq!(valuation.rows[0].instrument_id, "B");
}

// =============================================================================
// Summary
// =============================================================================

#[test]
fn when_rows_are_summed_percentages_come_from_the_totals_not_the_row_average() {
    // Given: a small position up 100% and a large one down 10%
    let positions = [position("S", 1.0, 10.0), position("L", 100.0, 10.0)];
    let closes = HashMap::from([
        (String::from("S"), daily(&[10.0, 20.0])),
        (String::from("L"), daily(&[10.0, 9.0])),
    ]);

    // When
    let valuation = valuate(&positions, &closes, None);
    let summary = valuation.summary;

    // Then
    let day_absolute: f64 = valuation.rows.iter().map(|row| row.day_absolute).sum();
    let day_reference: f64 = valuation.rows.iter().map(|row| row.day_reference).sum();
    let total_absolute: f64 = valuation.rows.iter().map(|row| row.total_absolute).sum();
    let invested: f64 = valuation.rows.iter().map(|row| row.invested).sum();

    assert_eq!(summary.current, 920.0);
    assert_eq!(summary.invested, 1_010.0);
    assert!((summary.day_percent - day_absolute / day_reference * 100.0).abs() < 1e-9);
    assert!((summary.total_percent - total_absolute / invested * 100.0).abs() < 1e-9);

    let mean_of_rows = valuation.rows.iter().map(|row| row.total_percent).sum::<f64>() / 2.0;
    assert!((summary.total_percent - mean_of_rows).abs() > 1.0);
}

#[test]
fn when_nothing_is_held_the_summary_is_zero() {
    let valuation = valuate(&[], &HashMap::new(), None);
    assert!(valuation.is_empty());
    assert_eq!(valuation.summary.day_percent, 0.0);
    assert_eq!(valuation.summary.total_percent, 0.0);
}

// =============================================================================
// Sorting
// =============================================================================

#[test]
fn when_holdings_are_sorted_each_key_orders_rows() {
    let positions = [
        position("B", 1.0, 100.0),
        position("A", 3.0, 100.0),
        position("C", 2.0, 100.0),
    ];
    let mut rows = valuate(&positions, &HashMap::new(), None).rows;

    sort_rows(&mut rows, HoldingSort::Value, SortDirection::Descending);
    let ids: Vec<&str> = rows.iter().map(|row| row.instrument_id.as_str()).collect();
    assert_eq!(ids, ["A", "C", "B"]);

    sort_rows(&mut rows, HoldingSort::Symbol, SortDirection::Ascending);
    let ids: Vec<&str> = rows.iter().map(|row| row.instrument_id.as_str()).collect();
    assert_eq!(ids, ["A", "B", "C"]);
}

// =============================================================================
// Portfolio feed
// =============================================================================

#[tokio::test]
async fn when_the_portfolio_feed_loads_every_holding_gets_a_row_and_sparkline() {
    // Given: a simulated account with two holdings
    let source = Arc::new(
        SimulatedSource::new()
            .with_portfolio(10_000.0, vec![position("INFY", 5.0, 1_400.0), position("TCS", 2.0, 3_600.0)]),
    );
    let feed = PortfolioFeed::new(source.clone(), source.clone(), &TickviewConfig::default());

    // When: a full load runs
    let frame = feed
        .load(LoadRequest {
            range: RangeKey::OneDay,
            silent: false,
        })
        .await
        .expect("portfolio loads");

    // Then: both holdings are valued live with sparklines
    assert_eq!(frame.valuation.rows.len(), 2);
    assert!(frame.valuation.rows.iter().all(|row| row.is_live));
    assert_eq!(frame.sparklines.len(), 2);
    assert!(frame.sparklines.values().all(|line| line.values.len() >= 2));
    assert_eq!(frame.snapshot.cash, 10_000.0);
    assert_eq!(source.live_calls(), 1);
}

#[tokio::test]
async fn when_a_silent_refresh_runs_only_live_prices_are_fetched_again() {
    // Given: a loaded feed
    let source = Arc::new(SimulatedSource::new().with_portfolio(0.0, vec![position("INFY", 1.0, 1_000.0)]));
    let feed = PortfolioFeed::new(source.clone(), source.clone(), &TickviewConfig::default());
    feed.load(LoadRequest {
        range: RangeKey::OneDay,
        silent: false,
    })
    .await
    .expect("first load");
    let candles_after_first = source.candle_calls();

    // When: a silent refresh follows
    feed.load(LoadRequest {
        range: RangeKey::OneDay,
        silent: true,
    })
    .await
    .expect("refresh");

    // Then: daily closes were reused, live prices pulled again
    assert_eq!(source.candle_calls(), candles_after_first);
    assert_eq!(source.live_calls(), 2);
}

#[tokio::test]
async fn when_daily_closes_fail_for_one_holding_the_rest_still_value() {
    // Given: one instrument whose history is unavailable
    let source = Arc::new(SimulatedSource::new().with_portfolio(
        0.0,
        vec![position("INFY", 1.0, 1_000.0), position("BROKEN", 3.0, 20.0)],
    ));
    source.fail_instrument("BROKEN");
    let feed = PortfolioFeed::new(source.clone(), source.clone(), &TickviewConfig::default());

    // When
    let frame = feed
        .load(LoadRequest {
            range: RangeKey::OneDay,
            silent: false,
        })
        .await
        .expect("batch tolerates member failure");

    // Then: the failed member falls back to cold start
    let broken = frame
        .valuation
        .rows
        .iter()
        .find(|row| row.instrument_id == "BROKEN")
        .expect("row present");
    assert!(broken.baseline.cold_start);
    assert_eq!(broken.day_absolute, 0.0);
    assert_eq!(frame.valuation.rows.len(), 2);
}
