//! # AEMET Harvester Library
//!
//! Resumable harvester for the AEMET OpenData service: daily climatology for
//! groups of weather stations and seven-day forecasts per municipality.
//!
//! ## Features
//!
//! - **Two-step fetch**: every query goes through the upstream envelope call
//!   before the data call that carries the records
//! - **Rate-limit aware retries**: server-advised waits for 429s, exponential
//!   backoff with jitter for transient faults
//! - **Resume capability**: per-unit checkpoints so an interrupted harvest
//!   picks up where it stopped
//! - **Error journal**: terminal failures are recorded with their URL and can
//!   be replayed later
//!
//! ## Quick Start
//!
//! ```no_run
//! use aemet_harvester::harvest::{HarvestConfig, HarvestExecutor};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::new("my-api-key", "./json", "./error_journal");
//! let executor = HarvestExecutor::from_config(config)?;
//!
//! let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
//! if let Some(report) = executor.run_historical_harvest(end, false).await {
//!     println!("{} stations stored", report.dataset.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - Work unit parsing and validation (station groups, municipality codes)
//! - [`registry`] - Code files that define the work units of a harvest
//! - [`fetcher`] - HTTP client, two-phase fetcher and payload normalization
//! - [`harvest`] - Retry policy, pacing, merge and the harvest orchestrator
//! - [`resume`] - Checkpoint store and error journal
//! - [`output`] - Durable datasets and file layout

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Upstream fetchers
pub mod fetcher;

/// Harvest orchestration, retry and pacing
pub mod harvest;

/// Work unit parsing and validation
pub mod identifier;

/// Harvest metrics
pub mod metrics;

/// Durable dataset files
pub mod output;

/// Code files that define work units
pub mod registry;

/// Checkpoints and error journal
pub mod resume;

pub use identifier::{WorkUnit, WorkUnitKind};

/// Literal written in place of a metric the station did not report.
pub const NO_DATA: &str = "no_data";

/// A single metric as reported upstream, or the `no_data` sentinel.
///
/// Values are kept verbatim (upstream uses decimal commas and codes such as
/// `"Ip"` for trace precipitation), so a measured zero stays distinct from
/// a missing reading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MetricValue {
    /// Value reported by the station
    Measured(String),
    /// Field absent, null or empty upstream
    #[default]
    NoData,
}

impl MetricValue {
    /// Normalize a raw upstream field.
    pub fn from_raw(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::String(s)) => Self::from_text(s),
            Some(Value::Number(n)) => Self::Measured(n.to_string()),
            _ => Self::NoData,
        }
    }

    fn from_text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == NO_DATA {
            Self::NoData
        } else {
            Self::Measured(s.to_string())
        }
    }

    /// Whether the station reported a value
    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }

    /// Value as written to disk
    pub fn as_str(&self) -> &str {
        match self {
            Self::Measured(s) => s,
            Self::NoData => NO_DATA,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(Self::from_raw(raw.as_ref()))
    }
}

/// Canonical daily metrics for one station and one date.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyMetrics {
    /// Mean temperature (`tmed`)
    pub avg_t: MetricValue,
    /// Maximum temperature (`tmax`)
    pub max_t: MetricValue,
    /// Minimum temperature (`tmin`)
    pub min_t: MetricValue,
    /// Precipitation (`prec`)
    pub precip: MetricValue,
    /// Mean wind speed (`velmedia`)
    pub avg_vel: MetricValue,
    /// Maximum gust (`racha`)
    pub max_vel: MetricValue,
    /// Mean relative humidity (`hrMedia`)
    pub avg_rel_hum: MetricValue,
    /// Maximum relative humidity (`hrMax`)
    pub max_rel_hum: MetricValue,
    /// Minimum relative humidity (`hrMin`)
    pub min_rel_hum: MetricValue,
}

impl DailyMetrics {
    /// Number of metrics carrying a measured value
    pub fn measured_count(&self) -> usize {
        [
            &self.avg_t,
            &self.max_t,
            &self.min_t,
            &self.precip,
            &self.avg_vel,
            &self.max_vel,
            &self.avg_rel_hum,
            &self.max_rel_hum,
            &self.min_rel_hum,
        ]
        .iter()
        .filter(|m| m.is_measured())
        .count()
    }
}

/// One normalized daily observation. Key = (`station_id`, `date`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Observation date
    pub date: NaiveDate,
    /// Station code (`indicativo`)
    pub station_id: String,
    /// Province name
    pub province: String,
    /// Station or town name
    pub town: String,
    /// Canonical metrics
    pub metrics: DailyMetrics,
    /// First time this date was stored
    pub ts_insert: DateTime<Utc>,
    /// Last time this date was refreshed
    pub ts_update: DateTime<Utc>,
}

/// Stored metrics for one date, with their timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEntry {
    /// Canonical metrics
    pub values: DailyMetrics,
    /// First time this date was stored
    pub ts_insert: DateTime<Utc>,
    /// Last time this date was refreshed
    pub ts_update: DateTime<Utc>,
}

/// All stored dates for one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationHistory {
    /// Station code
    pub town_code: String,
    /// Province name
    pub province: String,
    /// Station or town name
    pub town: String,
    /// Date → metrics
    #[serde(default)]
    pub date: BTreeMap<NaiveDate, DailyEntry>,
}

impl StationHistory {
    /// Empty history for the station a record belongs to
    pub fn for_record(record: &ObservationRecord) -> Self {
        Self {
            town_code: record.station_id.clone(),
            province: record.province.clone(),
            town: record.town.clone(),
            date: BTreeMap::new(),
        }
    }
}

/// Historical observations keyed by station code.
///
/// Used both as the accumulated data of a checkpoint and as the durable
/// dataset written when a harvest completes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoricalDataset {
    stations: BTreeMap<String, StationHistory>,
}

impl HistoricalDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stations
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether no station has been stored
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Total number of stored (station, date) pairs
    pub fn date_count(&self) -> usize {
        self.stations.values().map(|s| s.date.len()).sum()
    }

    /// Whether any date is stored for the station
    pub fn contains_station(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    /// History of one station
    pub fn station(&self, station_id: &str) -> Option<&StationHistory> {
        self.stations.get(station_id)
    }

    /// Iterate over stations in code order
    pub fn stations(&self) -> impl Iterator<Item = (&String, &StationHistory)> {
        self.stations.iter()
    }

    /// History for the record's station, created on first use
    pub fn station_entry(&mut self, record: &ObservationRecord) -> &mut StationHistory {
        self.stations
            .entry(record.station_id.clone())
            .or_insert_with(|| StationHistory::for_record(record))
    }

    /// Flatten back into observation records
    pub fn observations(&self) -> Vec<ObservationRecord> {
        self.stations
            .iter()
            .flat_map(|(id, history)| {
                history.date.iter().map(move |(date, entry)| ObservationRecord {
                    date: *date,
                    station_id: id.clone(),
                    province: history.province.clone(),
                    town: history.town.clone(),
                    metrics: entry.values.clone(),
                    ts_insert: entry.ts_insert,
                    ts_update: entry.ts_update,
                })
            })
            .collect()
    }
}

/// Inclusive date range requested from the climatology endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestWindow {
    /// First day
    pub start: NaiveDate,
    /// Last day
    pub end: NaiveDate,
}

/// Invalid harvest window
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The last day comes before the first
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart {
        /// First day
        start: NaiveDate,
        /// Last day
        end: NaiveDate,
    },
}

impl HarvestWindow {
    /// Build a window, rejecting `end < start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if end < start {
            return Err(WindowError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for HarvestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Per-day forecast fields, stored under their upstream names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPayload {
    /// Precipitation probability per period
    #[serde(rename = "probPrecipitacion", default)]
    pub prob_precipitation: Vec<Value>,
    /// Snow level per period
    #[serde(rename = "cotaNieveProv", default)]
    pub snow_level: Vec<Value>,
    /// Sky state per period
    #[serde(rename = "estadoCielo", default)]
    pub sky_state: Vec<Value>,
    /// Wind direction and speed per period
    #[serde(rename = "viento", default)]
    pub wind: Vec<Value>,
    /// Maximum gust per period
    #[serde(rename = "rachaMax", default)]
    pub max_gust: Vec<Value>,
    /// Temperature block
    #[serde(rename = "temperatura", default)]
    pub temperature: Map<String, Value>,
    /// Thermal sensation block
    #[serde(rename = "sensTermica", default)]
    pub thermal_sensation: Map<String, Value>,
    /// Relative humidity block
    #[serde(rename = "humedadRelativa", default)]
    pub relative_humidity: Map<String, Value>,
    /// Maximum UV index
    #[serde(rename = "uvMax", default)]
    pub uv_max: MetricValue,
}

/// One forecast day, written as `{"<date>": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, DayPayload>", into = "BTreeMap<String, DayPayload>")]
pub struct DayForecast {
    /// Forecast date as sent upstream (e.g. `2025-01-05T00:00:00`)
    pub date: String,
    /// Forecast fields
    pub values: DayPayload,
}

impl TryFrom<BTreeMap<String, DayPayload>> for DayForecast {
    type Error = String;

    fn try_from(map: BTreeMap<String, DayPayload>) -> Result<Self, Self::Error> {
        let mut entries = map.into_iter();
        match (entries.next(), entries.next()) {
            (Some((date, values)), None) => Ok(Self { date, values }),
            _ => Err("forecast day must hold exactly one date".to_string()),
        }
    }
}

impl From<DayForecast> for BTreeMap<String, DayPayload> {
    fn from(day: DayForecast) -> Self {
        BTreeMap::from([(day.date, day.values)])
    }
}

/// Seven-day forecast for one municipality. Key = `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// Municipality code
    pub id: String,
    /// Municipality name
    pub town: String,
    /// Province name
    pub province: String,
    /// Upstream elaboration timestamp
    pub elaborated: String,
    /// When this forecast was fetched
    pub fetched: DateTime<Utc>,
    /// `day_1` .. `day_7`
    pub prediction: BTreeMap<String, DayForecast>,
    /// First time this municipality was stored
    pub ts_insert: DateTime<Utc>,
    /// Last time this municipality was refreshed
    pub ts_update: DateTime<Utc>,
}

/// Stored forecasts, one per municipality.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastDataset {
    records: Vec<ForecastRecord>,
}

impl ForecastDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of municipalities
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no forecast has been stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored forecasts in insertion order
    pub fn records(&self) -> &[ForecastRecord] {
        &self.records
    }

    /// Forecast for a municipality
    pub fn get(&self, id: &str) -> Option<&ForecastRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Whether a forecast is stored for the municipality
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or overwrite a forecast, keeping the stored `ts_insert`.
    ///
    /// Returns `true` when the municipality was new.
    pub fn upsert(&mut self, mut record: ForecastRecord) -> bool {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                record.ts_insert = existing.ts_insert;
                *existing = record;
                false
            }
            None => {
                self.records.push(record);
                true
            }
        }
    }
}
