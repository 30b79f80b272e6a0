//! Reconciling fetched records with stored ones
//!
//! Merging is an idempotent union keyed by `(station, date)`: an unseen date
//! is inserted with its timestamps, a known date keeps its values and
//! `ts_insert` and only advances `ts_update`.

use crate::resume::HistoricalProgress;
use crate::{DailyEntry, ForecastDataset, HistoricalDataset, ObservationRecord, StationHistory};
use chrono::NaiveDate;
use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use std::ops::AddAssign;

/// Counts reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Dates that were not stored before
    pub new_dates: usize,
    /// Dates already stored whose `ts_update` advanced
    pub refreshed_dates: usize,
    /// Distinct stations touched
    pub stations: usize,
}

impl MergeStats {
    /// Whether the merge stored anything new
    pub fn has_new_data(&self) -> bool {
        self.new_dates > 0
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.new_dates += other.new_dates;
        self.refreshed_dates += other.refreshed_dates;
        self.stations += other.stations;
    }
}

fn merge_entry(history: &mut StationHistory, date: NaiveDate, entry: DailyEntry) -> bool {
    match history.date.entry(date) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
            true
        }
        Entry::Occupied(mut slot) => {
            let stored = slot.get_mut();
            if entry.ts_update > stored.ts_update {
                stored.ts_update = entry.ts_update;
            }
            false
        }
    }
}

/// Merge freshly fetched records into a dataset.
pub fn merge_observations(
    dataset: &mut HistoricalDataset,
    records: impl IntoIterator<Item = ObservationRecord>,
) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut touched = BTreeSet::new();

    for record in records {
        let date = record.date;
        let entry = DailyEntry {
            values: record.metrics.clone(),
            ts_insert: record.ts_insert,
            ts_update: record.ts_update,
        };
        let history = dataset.station_entry(&record);
        if merge_entry(history, date, entry) {
            stats.new_dates += 1;
        } else {
            stats.refreshed_dates += 1;
        }
        touched.insert(record.station_id);
    }

    stats.stations = touched.len();
    stats
}

/// Merge records into harvest progress, marking every date as processed.
pub fn merge_into_progress(progress: &mut HistoricalProgress, records: Vec<ObservationRecord>) -> MergeStats {
    for record in &records {
        progress.mark_processed(&record.station_id, record.date);
    }
    merge_observations(&mut progress.stations_data, records)
}

/// Fold one dataset into another with the same rules.
pub fn fold_dataset(target: &mut HistoricalDataset, source: &HistoricalDataset) -> MergeStats {
    merge_observations(target, source.observations())
}

/// Fold forecasts into a dataset, keeping stored `ts_insert`.
///
/// Returns the number of municipalities that were new.
pub fn fold_forecasts(target: &mut ForecastDataset, source: &ForecastDataset) -> usize {
    source
        .records()
        .iter()
        .filter(|record| target.upsert((*record).clone()))
        .count()
}
