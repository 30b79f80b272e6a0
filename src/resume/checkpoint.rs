//! Checkpoint payloads for resumable harvests
//!
//! A historical checkpoint keeps the dates already fetched per station plus
//! the records accumulated so far. A forecast checkpoint keeps the forecasts
//! fetched so far.

use crate::{ForecastDataset, HistoricalDataset};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Dates fetched for one station, written as `{"dates": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateSet {
    /// Fetched dates
    #[serde(default)]
    pub dates: BTreeSet<NaiveDate>,
}

/// Progress of a historical harvest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoricalProgress {
    /// Station code → fetched dates
    #[serde(default)]
    pub processed_dates: BTreeMap<String, DateSet>,
    /// Records accumulated during this harvest
    #[serde(default)]
    pub stations_data: HistoricalDataset,
}

impl HistoricalProgress {
    /// Whether the date was already fetched for the station
    pub fn is_processed(&self, station_id: &str, date: NaiveDate) -> bool {
        self.processed_dates
            .get(station_id)
            .is_some_and(|set| set.dates.contains(&date))
    }

    /// Record a fetched date. Returns `false` if it was already known.
    pub fn mark_processed(&mut self, station_id: &str, date: NaiveDate) -> bool {
        self.processed_dates
            .entry(station_id.to_string())
            .or_default()
            .dates
            .insert(date)
    }

    /// Total number of (station, date) pairs fetched
    pub fn processed_count(&self) -> usize {
        self.processed_dates.values().map(|s| s.dates.len()).sum()
    }

    /// Whether nothing has been fetched yet
    pub fn is_empty(&self) -> bool {
        self.processed_dates.is_empty() && self.stations_data.is_empty()
    }
}

/// Progress of a forecast harvest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastProgress {
    /// Forecasts fetched during this harvest
    #[serde(default)]
    pub forecasts: ForecastDataset,
}

impl ForecastProgress {
    /// Whether nothing has been fetched yet
    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }
}
