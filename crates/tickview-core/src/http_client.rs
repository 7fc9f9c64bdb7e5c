//! Transport seam for [`crate::adapters::HttpMarketSource`].
//!
//! Adapters build an [`HttpRequest`], hand it to an [`HttpClient`] and map the
//! raw [`HttpResponse`] onto source errors themselves. Production traffic goes
//! through [`ReqwestHttpClient`]; tests replay canned exchanges with
//! [`ScriptedHttpClient`].

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Credentials forwarded with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HttpAuth {
    #[default]
    None,
    BearerToken(String),
    /// Session cookie issued by the backend's login flow.
    Cookie(String),
}

impl HttpAuth {
    fn header(&self) -> Option<(&'static str, String)> {
        match self {
            Self::None => None,
            Self::BearerToken(token) => Some(("authorization", format!("Bearer {token}"))),
            Self::Cookie(cookie) => Some(("cookie", cookie.clone())),
        }
    }
}

/// Outgoing request. Query parameters are percent-encoded into `url` as they are added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// POST carrying `payload` as a JSON body.
    pub fn post_json<T: Serialize>(url: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(payload)?;
        let mut request = Self::get(url).with_header("content-type", "application/json");
        request.method = HttpMethod::Post;
        request.body = Some(body);
        Ok(request)
    }

    pub fn with_query(mut self, key: &str, value: impl AsRef<str>) -> Self {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url.push(separator);
        self.url.push_str(&urlencoding::encode(key));
        self.url.push('=');
        self.url.push_str(&urlencoding::encode(value.as_ref()));
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(self, auth: &HttpAuth) -> Self {
        match auth.header() {
            Some((name, value)) => self.with_header(name, value),
            None => self,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: serde_json::Value,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// The backend's `{"detail": ...}` explanation, if the body carries one.
    pub fn detail(&self) -> Option<String> {
        match self.decode::<ErrorBody>().ok()?.detail {
            serde_json::Value::Null => None,
            serde_json::Value::String(message) => Some(message),
            other => Some(other.to_string()),
        }
    }
}

/// Failure before any status line was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    /// The request could not be built or sent as given.
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpError {
    /// Whether sending the same request again may succeed.
    pub const fn retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tickview/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::Timeout(error.to_string())
    } else if error.is_connect() {
        HttpError::Connect(error.to_string())
    } else if error.is_builder() {
        HttpError::Invalid(error.to_string())
    } else {
        HttpError::Transport(error.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };
            let builder = request
                .headers
                .iter()
                .fold(builder, |builder, (name, value)| builder.header(name, value))
                .timeout(request.timeout);
            let builder = match request.body {
                Some(body) => builder.body(body),
                None => builder,
            };

            let response = builder.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(classify)?;
            Ok(HttpResponse { status, body })
        })
    }
}

/// Replays canned responses in order and records every request it receives.
///
/// The final scripted entry keeps answering once the rest are used up.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("scripted request log lock is not poisoned")
            .clone()
    }

    fn next_reply(&self) -> Result<HttpResponse, HttpError> {
        let mut script = self
            .script
            .lock()
            .expect("scripted response lock is not poisoned");
        if script.len() > 1 {
            if let Some(reply) = script.pop_front() {
                return reply;
            }
        }
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(HttpError::Invalid(String::from("no scripted response"))))
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.requests
            .lock()
            .expect("scripted request log lock is not poisoned")
            .push(request);
        let reply = self.next_reply();
        Box::pin(async move { reply })
    }
}
