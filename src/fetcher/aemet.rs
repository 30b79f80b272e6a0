//! AEMET OpenData fetcher
//!
//! Every query is answered in two steps: the envelope call returns
//! `{estado, datos, descripcion}` and, when `estado` is 200, the `datos` URL
//! carries the records.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetcher::aemet_config::{forecast_url, observations_url};
use crate::fetcher::aemet_http::AemetHttpClient;
use crate::fetcher::aemet_parser::AemetParser;
use crate::fetcher::{FetcherError, FetcherResult, WeatherFetcher};
use crate::harvest::retry::RetryPolicy;
use crate::harvest::{HarvestConfig, HarvestContext};
use crate::identifier::WorkUnit;
use crate::{ForecastRecord, HarvestWindow, ObservationRecord};

/// Fetcher for the climatology and municipal forecast endpoints
#[derive(Debug, Clone)]
pub struct AemetFetcher {
    http: AemetHttpClient,
    base_url: String,
}

impl AemetFetcher {
    /// Create a fetcher over an existing client
    pub fn new(http: AemetHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build the client from harvest settings
    pub fn from_config(config: &HarvestConfig) -> FetcherResult<Self> {
        let http = AemetHttpClient::new(
            config.api_key.clone(),
            config.connect_timeout,
            config.read_timeout,
            RetryPolicy::default().with_max_attempts(config.max_attempts),
        )?;
        Ok(Self::new(http, config.base_url.clone()))
    }

    /// Envelope call followed by the data call.
    ///
    /// `Ok(None)` when either call answers with an empty body.
    async fn fetch_two_step(
        &self,
        ctx: &HarvestContext,
        unit: &str,
        url: &str,
    ) -> FetcherResult<Option<(String, Value)>> {
        let Some(reply) = self.http.get_json(ctx, unit, url).await? else {
            debug!(unit = %unit, url = %url, "Empty envelope");
            return Ok(None);
        };
        self.follow_envelope(ctx, unit, url, &reply).await
    }

    async fn follow_envelope(
        &self,
        ctx: &HarvestContext,
        unit: &str,
        url: &str,
        reply: &Value,
    ) -> FetcherResult<Option<(String, Value)>> {
        let envelope = AemetParser::parse_envelope(reply).ok_or_else(|| FetcherError::Parse {
            url: url.to_string(),
            reason: "reply is not an estado/datos envelope".to_string(),
        })?;

        if envelope.status != 200 {
            warn!(
                unit = %unit,
                status = envelope.status,
                description = %envelope.description,
                "Envelope rejected the query"
            );
            return Err(FetcherError::Api {
                url: url.to_string(),
                status: envelope.status,
                description: envelope.description,
            });
        }

        let data_url = envelope.data_url.ok_or_else(|| FetcherError::Parse {
            url: url.to_string(),
            reason: "envelope has estado 200 but no datos URL".to_string(),
        })?;

        let data = self.http.get_json(ctx, unit, &data_url).await?;
        Ok(data.map(|value| (data_url, value)))
    }

    /// Journaled URL: a list reply is the data itself, anything else must be
    /// an envelope to follow.
    async fn fetch_journaled(
        &self,
        ctx: &HarvestContext,
        unit: &str,
        url: &str,
    ) -> FetcherResult<Option<(String, Value)>> {
        let Some(reply) = self.http.get_json(ctx, unit, url).await? else {
            return Ok(None);
        };
        if reply.is_array() {
            return Ok(Some((url.to_string(), reply)));
        }
        self.follow_envelope(ctx, unit, url, &reply).await
    }
}

#[async_trait]
impl WeatherFetcher for AemetFetcher {
    async fn fetch_observations(
        &self,
        ctx: &HarvestContext,
        window: HarvestWindow,
        unit: &WorkUnit,
    ) -> FetcherResult<Vec<ObservationRecord>> {
        let url = self.observations_url(window, unit);
        match self.fetch_two_step(ctx, unit.id(), &url).await? {
            Some((data_url, payload)) => {
                AemetParser::parse_observations(&data_url, &payload, Utc::now())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_forecast(
        &self,
        ctx: &HarvestContext,
        unit: &WorkUnit,
    ) -> FetcherResult<Option<ForecastRecord>> {
        let url = self.forecast_url(unit);
        match self.fetch_two_step(ctx, unit.id(), &url).await? {
            Some((data_url, payload)) => {
                AemetParser::parse_forecast(&data_url, &payload, unit.id(), Utc::now())
            }
            None => Ok(None),
        }
    }

    async fn fetch_observations_from(
        &self,
        ctx: &HarvestContext,
        url: &str,
    ) -> FetcherResult<Vec<ObservationRecord>> {
        match self.fetch_journaled(ctx, "replay", url).await? {
            Some((data_url, payload)) => {
                AemetParser::parse_observations(&data_url, &payload, Utc::now())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_forecast_from(
        &self,
        ctx: &HarvestContext,
        url: &str,
        municipality_id: &str,
    ) -> FetcherResult<Option<ForecastRecord>> {
        match self.fetch_journaled(ctx, municipality_id, url).await? {
            Some((data_url, payload)) => {
                AemetParser::parse_forecast(&data_url, &payload, municipality_id, Utc::now())
            }
            None => Ok(None),
        }
    }

    fn observations_url(&self, window: HarvestWindow, unit: &WorkUnit) -> String {
        observations_url(&self.base_url, window, unit.id())
    }

    fn forecast_url(&self, unit: &WorkUnit) -> String {
        forecast_url(&self.base_url, unit.id())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
