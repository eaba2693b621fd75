// Request execution: one HTTP call in flight at a time, with retries.
//
// Every call made by a `NimbusClient` (token refresh included) funnels
// through a single `RequestExecutor`. The executor holds an async mutex
// for the full retry sequence of a call, so a background poll and a
// user-triggered command never overlap on the wire.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

// ── RetryPolicy ──────────────────────────────────────────────────────

/// Exponential backoff between attempts of a single request.
///
/// The wait after failed attempt `n` (counting from 0) is
/// `base_delay * 2^n`, so the default policy sleeps 1s, 2s, 4s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay unit for the backoff curve. Default: 1s.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait inserted after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Worst-case time spent sleeping across a full retry sequence.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.max(1) - 1)
            .map(|attempt| self.delay_for(attempt))
            .sum()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 >= max_attempts || !e.is_retryable() {
                    error!(
                        error = %e,
                        attempts = attempt + 1,
                        "API call failed"
                    );
                    return Err(e);
                }

                let wait = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    "API call failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

// ── TransportConfig ──────────────────────────────────────────────────

/// Shared transport configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Transport)
    }
}

// ── Request / response ───────────────────────────────────────────────

/// Request body. Kept as owned data so the request can be rebuilt on
/// every retry attempt.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A fully described outbound call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }
}

/// A successful response with its body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| {
            let preview = truncate(&self.body, 200);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: self.body.clone(),
            }
        })
    }
}

/// Cut `text` down to at most `max` characters for error messages.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ── RequestExecutor ──────────────────────────────────────────────────

/// Serialized, retrying HTTP executor.
///
/// At most one call proceeds at a time: the lock is held across every
/// attempt and backoff sleep of a call, so concurrent callers queue
/// behind the whole retry sequence of the one ahead of them.
pub struct RequestExecutor {
    http: reqwest::Client,
    retry: RetryPolicy,
    lock: Mutex<()>,
}

impl RequestExecutor {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?, transport.retry))
    }

    /// Wrap a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            lock: Mutex::new(()),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute a request under the serialization lock, retrying transient
    /// failures according to the configured policy.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let _guard = self.lock.lock().await;
        retry_with_backoff(&self.retry, |attempt| self.send_once(request, attempt)).await
    }

    async fn send_once(&self, request: &ApiRequest, attempt: u32) -> Result<ApiResponse, Error> {
        debug!(method = %request.method, url = %request.url, attempt, "sending request");

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        debug!(status = status.as_u16(), body = %body, "response received");

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: request.url.to_string(),
                body: truncate(&body, 500),
            });
        }

        Ok(ApiResponse { status, body })
    }
}
