//! AEMET response parser
//!
//! Stateless functions turning upstream JSON into typed records. Missing
//! fields become the `no_data` sentinel (or an empty list/object for the
//! structured forecast fields); a number is never invented.

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{
    DailyMetrics, DayForecast, DayPayload, ForecastRecord, MetricValue, ObservationRecord, NO_DATA,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Days kept from a municipal forecast
pub const FORECAST_DAYS: usize = 7;

/// First-call reply: status plus the URL of the actual data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `estado`
    pub status: i64,
    /// `datos`
    pub data_url: Option<String>,
    /// `descripcion`
    pub description: String,
}

impl Envelope {
    /// Whether the data URL may be followed
    pub fn is_ok(&self) -> bool {
        self.status == 200 && self.data_url.is_some()
    }
}

/// Stateless parser for AEMET OpenData payloads
pub struct AemetParser;

impl AemetParser {
    /// Parse an envelope, or `None` if `value` is not one.
    ///
    /// `estado` may arrive as a number or a numeric string.
    pub fn parse_envelope(value: &Value) -> Option<Envelope> {
        let object = value.as_object()?;
        let status = match object.get("estado")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };

        Some(Envelope {
            status,
            data_url: object
                .get("datos")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: text_field(object, "descripcion").unwrap_or_default(),
        })
    }

    /// Normalize a list of raw daily climatology records.
    ///
    /// Records without `indicativo` or with an unparseable `fecha` are
    /// skipped with a warning.
    ///
    /// # Errors
    /// Returns [`FetcherError::Parse`] if `payload` is not a list.
    pub fn parse_observations(
        url: &str,
        payload: &Value,
        fetched_at: DateTime<Utc>,
    ) -> FetcherResult<Vec<ObservationRecord>> {
        let items = payload.as_array().ok_or_else(|| FetcherError::Parse {
            url: url.to_string(),
            reason: format!("expected a list of daily records, got {}", kind_of(payload)),
        })?;

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let Some(object) = item.as_object() else {
                warn!(url = %url, "Skipping non-object daily record");
                continue;
            };
            let Some(station_id) = text_field(object, "indicativo") else {
                warn!(url = %url, "Skipping daily record without indicativo");
                continue;
            };
            let Some(date) = object
                .get("fecha")
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            else {
                warn!(url = %url, station = %station_id, "Skipping daily record with invalid fecha");
                continue;
            };

            records.push(ObservationRecord {
                date,
                station_id,
                province: text_field(object, "provincia").unwrap_or_else(|| NO_DATA.to_string()),
                town: text_field(object, "nombre").unwrap_or_else(|| NO_DATA.to_string()),
                metrics: Self::parse_metrics(object),
                ts_insert: fetched_at,
                ts_update: fetched_at,
            });
        }

        Ok(records)
    }

    /// Map upstream metric fields onto their canonical names.
    pub fn parse_metrics(object: &Map<String, Value>) -> DailyMetrics {
        let metric = |key: &str| MetricValue::from_raw(object.get(key));
        DailyMetrics {
            avg_t: metric("tmed"),
            max_t: metric("tmax"),
            min_t: metric("tmin"),
            precip: metric("prec"),
            avg_vel: metric("velmedia"),
            max_vel: metric("racha"),
            avg_rel_hum: metric("hrMedia"),
            max_rel_hum: metric("hrMax"),
            min_rel_hum: metric("hrMin"),
        }
    }

    /// Normalize a municipal forecast reply (a one-element list).
    ///
    /// Returns `Ok(None)` for an empty list. The record is keyed by
    /// `municipality_id` (the queried code, which keeps its leading zeros
    /// where upstream sends a number).
    ///
    /// # Errors
    /// Returns [`FetcherError::Parse`] if `payload` is not a list of objects.
    pub fn parse_forecast(
        url: &str,
        payload: &Value,
        municipality_id: &str,
        fetched_at: DateTime<Utc>,
    ) -> FetcherResult<Option<ForecastRecord>> {
        let parse_error = |reason: String| FetcherError::Parse {
            url: url.to_string(),
            reason,
        };

        let items = payload
            .as_array()
            .ok_or_else(|| parse_error(format!("expected a forecast list, got {}", kind_of(payload))))?;
        let Some(first) = items.first() else {
            return Ok(None);
        };
        let object = first
            .as_object()
            .ok_or_else(|| parse_error(format!("expected a forecast object, got {}", kind_of(first))))?;

        let days = object
            .get("prediccion")
            .and_then(|p| p.get("dia"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if days.is_empty() {
            warn!(url = %url, municipality = %municipality_id, "Forecast carries no days");
        }

        let prediction = days
            .iter()
            .take(FORECAST_DAYS)
            .enumerate()
            .map(|(i, day)| (format!("day_{}", i + 1), Self::parse_day(day)))
            .collect::<BTreeMap<_, _>>();

        Ok(Some(ForecastRecord {
            id: municipality_id.to_string(),
            town: text_field(object, "nombre").unwrap_or_else(|| NO_DATA.to_string()),
            province: text_field(object, "provincia").unwrap_or_else(|| NO_DATA.to_string()),
            elaborated: text_field(object, "elaborado").unwrap_or_else(|| NO_DATA.to_string()),
            fetched: fetched_at,
            prediction,
            ts_insert: fetched_at,
            ts_update: fetched_at,
        }))
    }

    fn parse_day(day: &Value) -> DayForecast {
        let empty = Map::new();
        let object = day.as_object().unwrap_or(&empty);
        let list = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let block = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        DayForecast {
            date: text_field(object, "fecha").unwrap_or_else(|| NO_DATA.to_string()),
            values: DayPayload {
                prob_precipitation: list("probPrecipitacion"),
                snow_level: list("cotaNieveProv"),
                sky_state: list("estadoCielo"),
                wind: list("viento"),
                max_gust: list("rachaMax"),
                temperature: block("temperatura"),
                thermal_sensation: block("sensTermica"),
                relative_humidity: block("humedadRelativa"),
                uv_max: MetricValue::from_raw(object.get("uvMax")),
            },
        }
    }
}

/// Non-empty string field; numbers are rendered as text.
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
