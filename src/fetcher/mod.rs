//! Data fetcher implementations

use crate::harvest::HarvestContext;
use crate::identifier::WorkUnit;
use crate::{ForecastRecord, HarvestWindow, ObservationRecord};
use async_trait::async_trait;

pub mod aemet;
pub mod aemet_config;
pub mod aemet_http;
pub mod aemet_parser;
pub mod retry_formatter;

use retry_formatter::{FailureCause, FailureKind};

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Client could not be built or a request could not be formed
    #[error("transport error: {0}")]
    Transport(String),

    /// Envelope answered with a non-200 `estado`
    #[error("API error {status} at {url}: {description}")]
    Api {
        /// Envelope URL
        url: String,
        /// `estado` value
        status: i64,
        /// `descripcion` value
        description: String,
    },

    /// Non-retryable failure (4xx, malformed payload)
    #[error("request to {url} failed: {cause}")]
    Fatal {
        /// Failed URL
        url: String,
        /// Classified cause
        cause: FailureCause,
    },

    /// Retry budget used up
    #[error("request to {url} failed after {attempts} attempts: {cause}")]
    RetryExhausted {
        /// Failed URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Cause of the last attempt
        cause: FailureCause,
    },

    /// Payload is JSON but not in the expected shape
    #[error("parse error at {url}: {reason}")]
    Parse {
        /// URL of the payload
        url: String,
        /// What was wrong
        reason: String,
    },

    /// URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetcherError {
    /// URL the failure happened at, when known
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Api { url, .. }
            | Self::Fatal { url, .. }
            | Self::RetryExhausted { url, .. }
            | Self::Parse { url, .. } => Some(url),
            Self::InvalidUrl(url) => Some(url),
            Self::Transport(_) => None,
        }
    }

    /// Classified cause
    pub fn cause(&self) -> FailureCause {
        match self {
            Self::Fatal { cause, .. } | Self::RetryExhausted { cause, .. } => cause.clone(),
            Self::Api {
                status,
                description,
                ..
            } => FailureCause::new(
                FailureKind::ClientError(u16::try_from(*status).unwrap_or(0)),
                format!("estado {status}: {description}"),
            ),
            Self::Parse { reason, .. } => FailureCause::new(FailureKind::MalformedPayload, reason),
            Self::InvalidUrl(url) => FailureCause::new(FailureKind::Network, format!("invalid URL {url}")),
            Self::Transport(detail) => FailureCause::new(FailureKind::Network, detail),
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Source of observations and forecasts.
///
/// Every outbound call paces through the shared [`HarvestContext`] and is
/// retried by the client's policy. An empty payload is not an error: it
/// yields an empty `Vec` or `None`.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    /// Fetch daily observations for a station group over a window
    ///
    /// # Arguments
    /// * `ctx` - Pacing state of the harvest
    /// * `window` - Inclusive date range
    /// * `unit` - Station group
    async fn fetch_observations(
        &self,
        ctx: &HarvestContext,
        window: HarvestWindow,
        unit: &WorkUnit,
    ) -> FetcherResult<Vec<ObservationRecord>>;

    /// Fetch the seven-day forecast of a municipality
    async fn fetch_forecast(
        &self,
        ctx: &HarvestContext,
        unit: &WorkUnit,
    ) -> FetcherResult<Option<ForecastRecord>>;

    /// Re-issue a previously journaled URL.
    ///
    /// Accepts both an envelope URL and a data URL.
    async fn fetch_observations_from(
        &self,
        ctx: &HarvestContext,
        url: &str,
    ) -> FetcherResult<Vec<ObservationRecord>>;

    /// Re-issue a journaled forecast URL for `municipality_id`.
    ///
    /// Accepts both an envelope URL and a data URL.
    async fn fetch_forecast_from(
        &self,
        ctx: &HarvestContext,
        url: &str,
        municipality_id: &str,
    ) -> FetcherResult<Option<ForecastRecord>>;

    /// Envelope URL of a station group over a window
    fn observations_url(&self, window: HarvestWindow, unit: &WorkUnit) -> String;

    /// Envelope URL of a municipality forecast
    fn forecast_url(&self, unit: &WorkUnit) -> String;

    /// Get the base URL for this fetcher
    fn base_url(&self) -> &str;
}
