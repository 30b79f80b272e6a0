//! AEMET HTTP client
//!
//! Provides the single HTTP client used for every upstream interaction:
//! - Fixed request headers (API key, JSON, no cache)
//! - Global pacing through [`HarvestContext`]
//! - Response classification into [`Outcome`]
//! - Retries driven by [`RetryPolicy`]

use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

use crate::fetcher::aemet_config::API_KEY_HEADER;
use crate::fetcher::retry_formatter::{FailureCause, FailureKind};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::harvest::retry::{Outcome, RetryPolicy};
use crate::harvest::HarvestContext;
use crate::metrics::HttpRequestMetrics;

/// HTTP client for AEMET OpenData
#[derive(Debug, Clone)]
pub struct AemetHttpClient {
    client: Client,
    api_key: String,
    policy: RetryPolicy,
}

impl AemetHttpClient {
    /// Build a client with separate connect and read timeouts
    ///
    /// # Errors
    /// Returns [`FetcherError::Transport`] when the TLS backend cannot be
    /// initialized.
    pub fn new(
        api_key: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        policy: RetryPolicy,
    ) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| FetcherError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            policy,
        })
    }

    /// Retry policy applied to every call
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` as JSON, retrying per policy.
    ///
    /// Returns `Ok(None)` for an empty body.
    pub async fn get_json(
        &self,
        ctx: &HarvestContext,
        unit: &str,
        url: &str,
    ) -> FetcherResult<Option<Value>> {
        self.policy
            .run(unit, url, |attempt| self.execute(ctx, url, attempt))
            .await
    }

    /// One paced request, classified.
    async fn execute(&self, ctx: &HarvestContext, url: &str, attempt: u32) -> Outcome {
        ctx.pace().await;

        let metrics = HttpRequestMetrics::start(endpoint_label(url), attempt);
        debug!(url = %url, attempt, "GET");

        let response = match self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                metrics.record_network_error();
                return Outcome::Transient(FailureCause::from_reqwest(&e));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if let Some(outcome) = classify_status(status, response.headers()) {
            return outcome;
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Outcome::Transient(FailureCause::from_reqwest(&e)),
        };

        let outcome = classify_body(&body);
        if matches!(outcome, Outcome::RateLimited { .. }) {
            metrics.record_rate_limited();
        }
        outcome
    }
}

/// Classify a response by status alone. `None` means read the body.
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> Option<Outcome> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(Outcome::RateLimited {
            retry_after: parse_retry_after(headers),
        });
    }
    if status.is_server_error() {
        return Some(Outcome::Transient(FailureCause::new(
            FailureKind::ServerError(status.as_u16()),
            format!("HTTP {}", status.as_u16()),
        )));
    }
    if status.is_client_error() {
        return Some(Outcome::Fatal(FailureCause::new(
            FailureKind::ClientError(status.as_u16()),
            format!("HTTP {}", status.as_u16()),
        )));
    }
    if !status.is_success() {
        return Some(Outcome::Fatal(FailureCause::new(
            FailureKind::ClientError(status.as_u16()),
            format!("unexpected HTTP {}", status.as_u16()),
        )));
    }
    None
}

/// Classify a 2xx body.
///
/// Empty → `Success(None)`; JSON with `estado`/`status` 429 → `RateLimited`;
/// other JSON → `Success(Some)`; anything else → `Fatal(MalformedPayload)`.
pub fn classify_body(body: &[u8]) -> Outcome {
    let text = decode_body(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Outcome::Success(None);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            if body_status(&value) == Some(429) {
                Outcome::RateLimited { retry_after: None }
            } else {
                Outcome::Success(Some(value))
            }
        }
        Err(e) => {
            let preview: String = trimmed.chars().take(120).collect();
            Outcome::Fatal(FailureCause::new(
                FailureKind::MalformedPayload,
                format!("{e} (body starts with {preview:?})"),
            ))
        }
    }
}

/// UTF-8 when valid, otherwise ISO-8859-1 (one byte per code point).
pub fn decode_body(body: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(body.iter().map(|&b| char::from(b)).collect()),
    }
}

fn body_status(value: &Value) -> Option<i64> {
    let object = value.as_object()?;
    ["estado", "status"].iter().find_map(|key| match object.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn endpoint_label(url: &str) -> &'static str {
    if url.contains("/valores/climatologicos/") {
        "climatology"
    } else if url.contains("/prediccion/") {
        "forecast"
    } else {
        "datos"
    }
}
