//! Failure classification and retry message formatting.
//!
//! Every failed outbound call is reduced to a [`FailureCause`] so retry logs,
//! the error journal and the final failure summary all describe it the same
//! way.

use reqwest::{Error as ReqwestError, StatusCode};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request or read timed out
    Timeout,
    /// Peer reset or closed the connection
    ConnectionReset,
    /// Host name could not be resolved
    Dns,
    /// Connection could not be established
    Connect,
    /// Other transport failure
    Network,
    /// HTTP 429 or a 429 status inside the body
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 4xx other than 429
    ClientError(u16),
    /// Body is neither empty nor JSON
    MalformedPayload,
}

impl FailureKind {
    /// Short description used in log lines.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection reset",
            Self::Dns => "DNS failure",
            Self::Connect => "connection failed",
            Self::Network => "network error",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                401 => "unauthorized (check API key)",
                403 => "forbidden",
                404 => "resource not found",
                _ => "client error",
            },
            Self::MalformedPayload => "malformed payload",
        }
    }

    /// Suggested remediation shown after the last attempt.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout | Self::ConnectionReset | Self::Network => {
                "Check your network connection and retry with `replay`"
            }
            Self::Dns | Self::Connect => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Increase --request-delay-secs to stay under the API quota",
            Self::ServerError(_) => "AEMET OpenData may be degraded, replay the journal later",
            Self::ClientError(401) | Self::ClientError(403) => {
                "Verify AEMET_API_KEY is valid and not expired"
            }
            Self::ClientError(_) => "Check the station or municipality codes in the code files",
            Self::MalformedPayload => "Upstream sent an unexpected body, replay the journal later",
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientError(_) | Self::MalformedPayload)
    }
}

/// A classified failure with the underlying message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCause {
    /// Classification
    pub kind: FailureKind,
    /// Underlying error text
    pub detail: String,
}

impl FailureCause {
    /// New cause
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a transport error from reqwest.
    pub fn from_reqwest(err: &ReqwestError) -> Self {
        Self::new(extract_failure_kind(err.status(), Some(err)), error_chain(err))
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            f.write_str(self.kind.description())
        } else {
            write!(f, "{}: {}", self.kind.description(), self.detail)
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Failure that triggered the retry
    pub cause: FailureCause,
    /// Wait until the next attempt
    pub backoff_duration: Duration,
    /// Work unit being fetched
    pub unit: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        cause: FailureCause,
        backoff_duration: Duration,
        unit: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            cause,
            backoff_duration,
            unit: unit.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            self.cause.kind.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_unit(&mut message, &self.unit);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded - resuming harvest",
            self.attempt, self.max_attempts
        );
        append_unit(&mut message, &self.unit);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let unit = if self.unit.is_empty() {
            "unknown"
        } else {
            &self.unit
        };

        let mut lines = vec![
            format!("[FAILED] Request failed after {} attempts", self.attempt),
            format!("  Last error: {}", self.cause),
            format!("  Unit: {unit}"),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.cause.kind.suggestion().to_string()];
        if self.cause.kind.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-attempts (current: {})",
                self.max_attempts
            ));
        }
        suggestions
    }
}

/// Extract a [`FailureKind`] from an HTTP status or reqwest error.
pub fn extract_failure_kind(status: Option<StatusCode>, err: Option<&ReqwestError>) -> FailureKind {
    if let Some(status) = status {
        let code = status.as_u16();
        if code == 429 {
            return FailureKind::RateLimit;
        }
        if status.is_server_error() {
            return FailureKind::ServerError(code);
        }
        if status.is_client_error() {
            return FailureKind::ClientError(code);
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return FailureKind::Timeout;
        }

        let chain = error_chain(err).to_lowercase();
        if chain.contains("dns")
            || chain.contains("failed to lookup address")
            || chain.contains("name or service not known")
            || chain.contains("no such host")
        {
            return FailureKind::Dns;
        }
        if chain.contains("connection reset") || chain.contains("reset by peer") {
            return FailureKind::ConnectionReset;
        }
        if err.is_connect() {
            return FailureKind::Connect;
        }
        if err.is_decode() {
            return FailureKind::MalformedPayload;
        }
    }

    FailureKind::Network
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

fn append_unit(buffer: &mut String, unit: &str) {
    if !unit.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(unit);
        buffer.push(')');
    }
}
