use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::TickviewConfig;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::retry::RetryPolicy;
use crate::source::{
    AccountSource, CandleRequest, CandleResponse, DepositRequest, LivePriceBatch, LivePriceRequest,
    MarketHealth, MarketSource, PortfolioSnapshot, SourceError, SourceFuture, TradeAck,
    TradeRequest,
};

/// Adapter for the backend's `/api` HTTP surface.
///
/// Candle fetches are retried on transient failures; account mutations are
/// sent once and refusals come back as [`SourceError::rejected`].
#[derive(Clone)]
pub struct HttpMarketSource {
    client: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
    candle_retry: RetryPolicy,
}

impl HttpMarketSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), base_url)
    }

    pub fn from_config(config: &TickviewConfig) -> Self {
        Self::new(config.base_url.as_str()).with_timeout(config.request_timeout)
    }

    pub fn with_http_client(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth: HttpAuth::None,
            timeout: Duration::from_secs(3),
            candle_retry: RetryPolicy::default().with_jitter(),
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_candle_retry(mut self, policy: RetryPolicy) -> Self {
        self.candle_retry = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn candles_request(&self, req: &CandleRequest) -> HttpRequest {
        // exchange tokens are numeric, anything else is a trading symbol
        let key = if req.instrument.chars().all(|c| c.is_ascii_digit()) {
            "token"
        } else {
            "symbol"
        };
        HttpRequest::get(self.url("/api/candles"))
            .with_query(key, &req.instrument)
            .with_query("interval", req.interval.as_str())
            .with_query("from", req.from.format_rfc3339())
            .with_query("to", req.to.format_rfc3339())
    }

    fn post<T: Serialize>(&self, path: &str, payload: &T) -> Result<HttpRequest, SourceError> {
        HttpRequest::post_json(self.url(path), payload)
            .map_err(|error| SourceError::internal(format!("cannot encode request: {error}")))
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        let request = request.with_auth(&self.auth).with_timeout(self.timeout);
        debug!(method = ?request.method, url = %request.url, "sending request");
        self.client.execute(request).await.map_err(|error| {
            if error.retryable() {
                SourceError::unavailable(error.to_string())
            } else {
                SourceError::internal(error.to_string())
            }
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        refusal: Refusal,
    ) -> Result<T, SourceError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, refusal));
        }
        response
            .decode()
            .map_err(|error| SourceError::decode(format!("malformed response body: {error}")))
    }
}

/// How a 4xx answer should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    InvalidRequest,
    Rejected,
}

fn status_error(response: &HttpResponse, refusal: Refusal) -> SourceError {
    let status = response.status;
    let detail = response.detail();
    match status {
        429 => SourceError::rate_limited(detail.unwrap_or_else(|| String::from("rate limited"))),
        408 | 500..=599 => SourceError::unavailable(format!(
            "upstream returned status {status}{}",
            detail.map(|d| format!(": {d}")).unwrap_or_default()
        )),
        400..=499 => match refusal {
            Refusal::Rejected => SourceError::rejected(
                detail.unwrap_or_else(|| format!("request refused with status {status}")),
            ),
            Refusal::InvalidRequest => SourceError::invalid_request(format!(
                "upstream returned status {status}{}",
                detail.map(|d| format!(": {d}")).unwrap_or_default()
            )),
        },
        _ => SourceError::internal(format!("unexpected status {status}")),
    }
}

impl MarketSource for HttpMarketSource {
    fn candles<'a>(&'a self, req: CandleRequest) -> SourceFuture<'a, CandleResponse> {
        Box::pin(async move {
            let request = self.candles_request(&req);
            self.candle_retry
                .run("candles", || self.fetch_json(request.clone(), Refusal::InvalidRequest))
                .await
        })
    }

    fn market_health<'a>(&'a self) -> SourceFuture<'a, MarketHealth> {
        Box::pin(async move {
            self.fetch_json(HttpRequest::get(self.url("/api/health")), Refusal::InvalidRequest)
                .await
        })
    }

    fn live_prices<'a>(&'a self, req: LivePriceRequest) -> SourceFuture<'a, LivePriceBatch> {
        Box::pin(async move {
            let request = self.post("/api/prices/live", &req)?;
            self.fetch_json(request, Refusal::InvalidRequest).await
        })
    }
}

impl AccountSource for HttpMarketSource {
    fn portfolio<'a>(&'a self) -> SourceFuture<'a, PortfolioSnapshot> {
        Box::pin(async move {
            self.fetch_json(HttpRequest::get(self.url("/api/portfolio")), Refusal::InvalidRequest)
                .await
        })
    }

    fn deposit<'a>(&'a self, req: DepositRequest) -> SourceFuture<'a, PortfolioSnapshot> {
        Box::pin(async move {
            let request = self.post("/api/portfolio/deposit", &req)?;
            self.fetch_json(request, Refusal::Rejected).await
        })
    }

    fn submit_trade<'a>(&'a self, req: TradeRequest) -> SourceFuture<'a, TradeAck> {
        Box::pin(async move {
            let request = self.post("/api/trades", &req)?;
            self.fetch_json(request, Refusal::Rejected).await
        })
    }
}
