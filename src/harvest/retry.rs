//! Table-driven retry policy
//!
//! Each outbound call is reduced to an [`Outcome`]; [`RetryPolicy::decide`]
//! maps it to a [`RetryDecision`]:
//!
//! | Outcome                    | Attempts left | Decision                                |
//! |----------------------------|---------------|-----------------------------------------|
//! | `Success`                  | any           | `Done`                                  |
//! | `Fatal`                    | any           | `GiveUp` (no retry)                     |
//! | `RateLimited(retry_after)` | yes           | `Wait(retry_after or 61 s)`             |
//! | `Transient`                | yes           | `Wait(clamp(2^(n-1) s, 4, 60) + jitter)`|
//! | `RateLimited`/`Transient`  | no            | `GiveUp` → `RetryExhausted`             |

use crate::fetcher::retry_formatter::{FailureCause, FailureKind, RetryContext};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::harvest::config::{
    calculate_backoff, BACKOFF_MAX, BACKOFF_MIN, DEFAULT_RATE_LIMIT_DELAY, MAX_ATTEMPTS, MAX_JITTER,
};
use crate::metrics;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Classified result of one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Parsed JSON body, or `None` for an empty body
    Success(Option<Value>),
    /// HTTP 429 or a 429 status inside the body
    RateLimited {
        /// Server-advised wait, if any
        retry_after: Option<Duration>,
    },
    /// Timeout, reset, DNS failure or 5xx
    Transient(FailureCause),
    /// Non-429 4xx or malformed payload
    Fatal(FailureCause),
}

impl Outcome {
    /// Failure cause of a non-success outcome
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Success(_) => None,
            Self::RateLimited { retry_after } => Some(FailureCause::new(
                FailureKind::RateLimit,
                retry_after
                    .map(|d| format!("retry after {}s", d.as_secs()))
                    .unwrap_or_default(),
            )),
            Self::Transient(cause) | Self::Fatal(cause) => Some(cause.clone()),
        }
    }
}

/// What to do after an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the payload
    Done,
    /// Sleep, then try again
    Wait(Duration),
    /// Stop and report the failure
    GiveUp,
}

/// Retry settings. All delays are configurable so tests can run at zero delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    default_rate_limit_delay: Duration,
    backoff_min: Duration,
    backoff_max: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            default_rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            backoff_min: BACKOFF_MIN,
            backoff_max: BACKOFF_MAX,
            max_jitter: MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Policy with every delay set to zero
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_rate_limit_delay: Duration::ZERO,
            backoff_min: Duration::ZERO,
            backoff_max: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Set the attempt ceiling (at least 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the wait used when a rate limit carries no advice
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.default_rate_limit_delay = delay;
        self
    }

    /// Set the transient backoff bounds and jitter
    pub fn with_backoff(mut self, min: Duration, max: Duration, jitter: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max.max(min);
        self.max_jitter = jitter;
        self
    }

    /// Attempt ceiling
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what follows `outcome` on the 1-based `attempt`.
    pub fn decide(&self, outcome: &Outcome, attempt: u32) -> RetryDecision {
        match outcome {
            Outcome::Success(_) => RetryDecision::Done,
            Outcome::Fatal(_) => RetryDecision::GiveUp,
            _ if attempt >= self.max_attempts => RetryDecision::GiveUp,
            Outcome::RateLimited { retry_after } => {
                RetryDecision::Wait(retry_after.unwrap_or(self.default_rate_limit_delay))
            }
            Outcome::Transient(_) => RetryDecision::Wait(self.transient_delay(attempt)),
        }
    }

    fn transient_delay(&self, attempt: u32) -> Duration {
        let base = calculate_backoff(attempt, self.backoff_min, self.backoff_max);
        if self.max_jitter.is_zero() {
            return base;
        }
        base + self.max_jitter.mul_f64(rand::random::<f64>())
    }

    /// Drive `op` until the policy says stop.
    ///
    /// `op` receives the 1-based attempt number. Each retry is logged with
    /// the unit, the attempt counter, the cause and the wait.
    pub async fn run<F, Fut>(&self, unit: &str, url: &str, mut op: F) -> FetcherResult<Option<Value>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut attempt = 1;
        let mut last_cause: Option<FailureCause> = None;

        loop {
            let outcome = op(attempt).await;
            let decision = self.decide(&outcome, attempt);

            match (decision, outcome) {
                (_, Outcome::Success(payload)) => {
                    if let Some(cause) = last_cause {
                        let ctx =
                            RetryContext::new(attempt, self.max_attempts, cause, Duration::ZERO, unit, url);
                        info!(unit = %unit, attempt, "{}", ctx.format_success());
                    }
                    return Ok(payload);
                }
                (RetryDecision::Wait(delay), failed) => {
                    let cause = failed
                        .cause()
                        .unwrap_or_else(|| FailureCause::new(FailureKind::Network, ""));
                    let ctx =
                        RetryContext::new(attempt, self.max_attempts, cause.clone(), delay, unit, url);
                    warn!(
                        unit = %unit,
                        attempt,
                        max_attempts = self.max_attempts,
                        cause = %cause,
                        wait_ms = delay.as_millis() as u64,
                        "{}",
                        ctx.format_retry()
                    );
                    metrics::record_retry_backoff(delay, attempt);
                    tokio::time::sleep(delay).await;

                    last_cause = Some(cause);
                    attempt += 1;
                }
                (_, Outcome::Fatal(cause)) => {
                    warn!(unit = %unit, url = %url, cause = %cause, "Fatal failure, not retrying");
                    return Err(FetcherError::Fatal {
                        url: url.to_string(),
                        cause,
                    });
                }
                (_, failed) => {
                    let cause = failed
                        .cause()
                        .unwrap_or_else(|| FailureCause::new(FailureKind::Network, ""));
                    let ctx =
                        RetryContext::new(attempt, self.max_attempts, cause.clone(), Duration::ZERO, unit, url);
                    error!(unit = %unit, attempt, "{}", ctx.format_failure());
                    return Err(FetcherError::RetryExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }
}
