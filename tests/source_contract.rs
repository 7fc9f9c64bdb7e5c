//! Contract tests for the HTTP market and account adapter
//!
//! These tests script raw HTTP exchanges and verify request shapes, wire
//! decoding and how upstream failures map to `SourceError` kinds.

use std::sync::Arc;

use tickview_core::http_client::{HttpMethod, ScriptedHttpClient};
use tickview_core::{
    AccountSource, CandleInterval, CandleRequest, DepositRequest, HttpAuth, HttpError,
    HttpMarketSource, HttpResponse, LivePriceRequest, MarketSource, RangeKey, SourceErrorKind,
    TradeRequest, TradeSide, UtcDateTime, ValidationError,
};

fn adapter(
    responses: Vec<Result<HttpResponse, HttpError>>,
) -> (Arc<ScriptedHttpClient>, HttpMarketSource) {
    let client = Arc::new(ScriptedHttpClient::new(responses));
    let source = HttpMarketSource::with_http_client(client.clone(), "http://127.0.0.1:8000");
    (client, source)
}

fn day_request(instrument: &str) -> CandleRequest {
    let now = UtcDateTime::parse("2024-03-05T12:00:00+05:30").expect("ts");
    CandleRequest::for_range(instrument, RangeKey::OneWeek, now).expect("valid")
}

// =============================================================================
// Candles
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_candles_are_fetched_the_body_is_normalized_in_order() {
    // Given: an out-of-order body with one malformed record
    let (client, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{"series": [
            {"timestamp": "2024-03-05", "open": 10, "high": 12, "low": 9, "close": 11},
            ["2024-03-04", 9, 10, 8, 9.5, 100],
            {"timestamp": "2024-03-06", "close": "n/a"}
        ]}"#,
    ))]);

    // When
    let series = source
        .candles(day_request("RELIANCE"))
        .await
        .expect("fetched")
        .normalized();

    // Then: one GET with the range's daily window
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].close, 9.5);
    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert!(requests[0].url.contains("/api/candles?symbol=RELIANCE&interval=ONE_DAY&from="));
}

#[tokio::test(start_paused = true)]
async fn when_a_body_mixes_in_elements_of_unknown_shape_the_good_bars_survive() {
    // Given: a boolean close and a null entry between two readable candles
    let (_, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{"series": [
            {"t": "2024-03-04", "o": 9, "h": 10, "l": 8, "c": 9.5},
            {"t": "2024-03-05", "c": true},
            null,
            {"t": "2024-03-06", "o": 10, "h": 12, "l": 9, "c": 11}
        ]}"#,
    ))]);

    // When
    let response = source.candles(day_request("INFY")).await.expect("body decodes");

    // Then: only the unreadable elements are left out
    assert_eq!(response.series.len(), 4);
    let closes: Vec<f64> = response.normalized().iter().map(|bar| bar.close).collect();
    assert_eq!(closes, vec![9.5, 11.0]);
}

#[tokio::test(start_paused = true)]
async fn when_upstream_is_briefly_rate_limited_the_candle_fetch_is_retried() {
    let (client, source) = adapter(vec![
        Ok(HttpResponse::with_status(429, r#"{"detail": "slow down"}"#)),
        Err(HttpError::Connect(String::from("connection reset"))),
        Ok(HttpResponse::ok_json(r#"{"series": []}"#)),
    ]);

    let response = source.candles(day_request("TCS")).await.expect("third attempt succeeds");

    assert!(response.series.is_empty());
    assert_eq!(client.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn when_upstream_stays_down_the_fetch_gives_up_after_three_attempts() {
    let (client, source) = adapter(vec![Ok(HttpResponse::with_status(503, ""))]);

    let error = source.candles(day_request("TCS")).await.expect_err("exhausted");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(error.retryable());
    assert_eq!(error.code(), "source.unavailable");
    assert_eq!(client.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn when_the_candle_request_is_refused_it_is_not_retried() {
    let (client, source) = adapter(vec![Ok(HttpResponse::with_status(
        400,
        r#"{"detail": "unknown symbol"}"#,
    ))]);

    let error = source.candles(day_request("NOPE")).await.expect_err("refused");

    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    assert!(error.message().contains("unknown symbol"));
    assert_eq!(client.requests().len(), 1);
}

#[test]
fn when_a_candle_window_is_inverted_no_request_can_be_built() {
    let now = UtcDateTime::now();
    let error = CandleRequest::new("INFY", CandleInterval::OneDay, now, now.minus_days(1))
        .expect_err("inverted window");
    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
}

// =============================================================================
// Health and live prices
// =============================================================================

#[tokio::test]
async fn when_health_reports_camel_case_the_flag_is_read() {
    let (_, source) = adapter(vec![Ok(HttpResponse::ok_json(r#"{"marketOpen": true}"#))]);
    assert!(source.market_health().await.expect("health").market_open);
}

#[tokio::test]
async fn when_health_omits_the_flag_the_market_reads_closed() {
    let (_, source) = adapter(vec![Ok(HttpResponse::ok_json(r#"{"status": "ok"}"#))]);
    assert!(!source.market_health().await.expect("health").market_open);
}

#[tokio::test]
async fn when_live_prices_are_requested_duplicates_are_dropped_and_the_batch_is_capped() {
    // Given: 70 ids with duplicates
    let ids: Vec<String> = (0..70).map(|i| format!("{}", 1000 + i % 65)).collect();
    let request = LivePriceRequest::new(ids, 15, true, 40).expect("valid");
    assert_eq!(request.instrument_ids.len(), 60);

    let (client, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{"prices": {
            "1000": {"last": 101.5, "series": [{"t": "2024-03-05T09:15:00+05:30", "c": 101.0}, {"t": "2024-03-05T09:16:00+05:30", "c": 101.5}]},
            "1001": {"last": null}
        }}"#,
    ))]);

    // When
    let batch = source.live_prices(request).await.expect("batch");

    // Then: one POST; only finite prices count as last prices
    let sent = client.requests();
    assert_eq!(sent[0].method, HttpMethod::Post);
    assert!(sent[0].url.ends_with("/api/prices/live"));
    let prices = batch.last_prices();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices["1000"], 101.5);
    assert_eq!(batch.prices["1000"].series.as_ref().map(Vec::len), Some(2));
}

#[tokio::test]
async fn when_one_live_point_is_unreadable_the_rest_of_the_batch_is_kept() {
    // Given: a numeric timestamp, a boolean close and a second instrument
    let request = LivePriceRequest::new(["1000", "1001"], 15, true, 40).expect("valid");
    let (_, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{"prices": {
            "1000": {"last": 101.5, "series": [
                {"t": 1709610300000, "c": 101.0},
                {"t": "2024-03-05T09:16:00+05:30", "c": true},
                {"t": "2024-03-05T09:17:00+05:30", "c": 101.5}
            ]},
            "1001": {"last": 88.0}
        }}"#,
    ))]);

    // When
    let batch = source.live_prices(request).await.expect("batch decodes");

    // Then
    assert_eq!(batch.last_prices().len(), 2);
    let closes: Vec<f64> = batch.prices["1000"]
        .series
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|point| point.close)
        .collect();
    assert_eq!(closes, vec![101.0, 101.5]);
}

#[test]
fn when_no_live_ids_are_given_the_request_is_invalid() {
    let error = LivePriceRequest::new(Vec::<String>::new(), 15, false, 0).expect_err("empty");
    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
}

// =============================================================================
// Account
// =============================================================================

#[tokio::test]
async fn when_the_portfolio_is_read_wire_names_map_onto_positions() {
    let (client, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{
            "cash": 1500.5,
            "realizedPL": -20,
            "positions": {"2885": {"symbol": "RELIANCE", "quantity": 3, "avg_price": 2400}},
            "updated_at": "2024-03-05T10:00:00Z"
        }"#,
    ))]);
    let source = source.with_auth(HttpAuth::Cookie(String::from("session=abc")));

    let snapshot = source.portfolio().await.expect("portfolio");

    assert_eq!(snapshot.cash, 1500.5);
    assert_eq!(snapshot.realized_pl, -20.0);
    let positions = snapshot.positions();
    assert_eq!(positions[0].instrument_id, "2885");
    assert_eq!(positions[0].average_cost, 2400.0);
    assert_eq!(snapshot.open_instrument_ids(), ["2885"]);
    assert_eq!(
        client.requests()[0].headers.get("cookie").map(String::as_str),
        Some("session=abc")
    );
}

#[tokio::test]
async fn when_a_deposit_is_rejected_the_reason_is_shown_verbatim_and_not_retried() {
    let (client, source) = adapter(vec![Ok(HttpResponse::with_status(
        400,
        r#"{"detail": "Deposit amount exceeds limit"}"#,
    ))]);

    let request = DepositRequest::new(5_000.0, 1e9).expect("valid locally");
    let error = source.deposit(request).await.expect_err("rejected upstream");

    assert_eq!(error.kind(), SourceErrorKind::Rejected);
    assert_eq!(error.to_string(), "Deposit amount exceeds limit");
    assert!(!error.retryable());
    assert_eq!(client.requests().len(), 1);
}

#[test]
fn when_a_deposit_breaks_local_rules_it_never_leaves_the_client() {
    assert_eq!(DepositRequest::new(0.0, 1e9), Err(ValidationError::DepositNotPositive));
    assert!(matches!(
        DepositRequest::new(1e9, 1e9),
        Err(ValidationError::DepositAboveCeiling { .. })
    ));
    assert!(matches!(
        DepositRequest::new(f64::NAN, 1e9),
        Err(ValidationError::NonFiniteValue { .. })
    ));
}

#[tokio::test]
async fn when_a_trade_executes_the_ack_is_decoded() {
    let (client, source) = adapter(vec![Ok(HttpResponse::ok_json(
        r#"{"symbol": "INFY", "token": "1594", "side": "BUY", "quantity": 2,
            "price": 1500.0, "amount": 3000.0, "executed_at": "2024-03-05T10:00:00Z"}"#,
    ))]);
    let side: TradeSide = "buy".parse().expect("side");

    let ack = source
        .submit_trade(TradeRequest::new("INFY", side, 2).expect("valid"))
        .await
        .expect("executed");

    assert_eq!(ack.side, TradeSide::Buy);
    assert_eq!(ack.amount, 3000.0);
    assert_eq!(ack.realized_pl, 0.0);
    let body = client.requests()[0].body.clone().expect("json body");
    let sent: serde_json::Value = serde_json::from_str(&body).expect("json");
    assert_eq!(sent["side"], "BUY");
    assert_eq!(sent["quantity"], 2);
}

#[test]
fn when_a_trade_has_no_quantity_it_is_invalid() {
    assert_eq!(
        TradeRequest::new("INFY", TradeSide::Sell, 0),
        Err(ValidationError::ZeroQuantity)
    );
    assert!("HOLD".parse::<TradeSide>().is_err());
}
