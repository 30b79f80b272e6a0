//! Continuation filters and error replay
//!
//! Continuation is coarse: a station group is pending while any of its
//! stations has no stored date at all. Error replay re-issues every
//! journaled URL and drains the entries it recovered.

use crate::fetcher::WeatherFetcher;
use crate::harvest::merge::{merge_observations, MergeStats};
use crate::harvest::progress::{HarvestItemType, ProgressReporter};
use crate::harvest::HarvestContext;
use crate::identifier::WorkUnit;
use crate::metrics::HarvestMetrics;
use crate::resume::{ErrorJournal, ResumeError};
use crate::{ForecastDataset, HistoricalDataset};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// Station groups with at least one station absent from `stored`.
pub fn pending_station_groups(groups: &[WorkUnit], stored: &HistoricalDataset) -> Vec<WorkUnit> {
    let pending: Vec<WorkUnit> = groups
        .iter()
        .filter(|group| group.station_codes().any(|code| !stored.contains_station(code)))
        .cloned()
        .collect();

    let missing_stations = pending
        .iter()
        .flat_map(|group| group.station_codes())
        .filter(|code| !stored.contains_station(code))
        .count();
    info!(
        pending = pending.len(),
        total = groups.len(),
        missing_stations,
        "Pending station groups"
    );
    pending
}

/// Municipalities without a stored forecast.
pub fn pending_towns(towns: &[WorkUnit], stored: &ForecastDataset) -> Vec<WorkUnit> {
    let pending: Vec<WorkUnit> = towns
        .iter()
        .filter(|town| !stored.contains(town.id()))
        .cloned()
        .collect();

    info!(pending = pending.len(), total = towns.len(), "Pending municipalities");
    pending
}

/// Counts of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// URLs re-issued
    pub attempted: usize,
    /// URLs answered with records
    pub succeeded: usize,
    /// URLs answered with no records
    pub empty: usize,
    /// URLs that failed again
    pub failed: usize,
    /// Journal entries removed
    pub drained: usize,
    /// Merge counts against `dataset`
    pub stats: MergeStats,
}

impl ReplayOutcome {
    /// URLs that no longer fail
    pub fn recovered(&self) -> usize {
        self.succeeded + self.empty
    }
}

/// Re-issue every journaled URL and merge what comes back into `dataset`.
///
/// Entries whose URL was answered are drained from the journal. Entries that
/// fail again stay as they are and are not appended a second time; when
/// nothing is recovered the journal file is left untouched.
pub async fn replay_journal(
    fetcher: &dyn WeatherFetcher,
    ctx: &HarvestContext,
    journal: &ErrorJournal,
    dataset: &mut HistoricalDataset,
    request_delay: Duration,
) -> Result<ReplayOutcome, ResumeError> {
    let urls = journal.list_failed_urls()?;
    let mut outcome = ReplayOutcome {
        attempted: urls.len(),
        ..Default::default()
    };
    if urls.is_empty() {
        info!(path = %journal.path().display(), "Error journal has nothing to replay");
        return Ok(outcome);
    }

    let mut recovered = HashSet::new();
    let mut reporter = ProgressReporter::new(urls.len(), HarvestItemType::JournalUrls);

    for (i, url) in urls.iter().enumerate() {
        info!("{} Replaying {}", reporter.position(), url);
        let metrics = HarvestMetrics::start("replay", url.as_str());

        match fetcher.fetch_observations_from(ctx, url).await {
            Ok(records) if records.is_empty() => {
                metrics.record_empty();
                outcome.empty += 1;
                recovered.insert(url.clone());
            }
            Ok(records) => {
                metrics.record_success(records.len());
                outcome.stats += merge_observations(dataset, records);
                outcome.succeeded += 1;
                recovered.insert(url.clone());
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                outcome.failed += 1;
            }
        }

        reporter.advance();
        if i + 1 < urls.len() {
            tokio::time::sleep(request_delay).await;
        }
    }

    if recovered.is_empty() {
        warn!(failed = outcome.failed, "No journaled URL recovered, journal left untouched");
        return Ok(outcome);
    }

    outcome.drained =
        journal.retain(|entry| entry.failed_url().map_or(true, |url| !recovered.contains(&url)))?;
    info!(
        recovered = outcome.recovered(),
        drained = outcome.drained,
        still_failing = outcome.failed,
        "Error replay finished"
    );
    Ok(outcome)
}

/// Re-issue every journaled forecast URL and upsert what comes back.
///
/// Follows the same draining rules as [`replay_journal`]. The record is
/// stored under the entry's municipality code, and `stats.new_dates` counts
/// municipalities that were not stored before.
pub async fn replay_forecast_journal(
    fetcher: &dyn WeatherFetcher,
    ctx: &HarvestContext,
    journal: &ErrorJournal,
    dataset: &mut ForecastDataset,
    request_delay: Duration,
) -> Result<ReplayOutcome, ResumeError> {
    let mut seen = HashSet::new();
    let targets: Vec<(String, String)> = journal
        .entries()?
        .into_iter()
        .filter_map(|entry| {
            let url = entry.failed_url()?;
            seen.insert(url.clone()).then(|| (entry.unit_id, url))
        })
        .collect();

    let mut outcome = ReplayOutcome {
        attempted: targets.len(),
        ..Default::default()
    };
    if targets.is_empty() {
        info!(path = %journal.path().display(), "Forecast journal has nothing to replay");
        return Ok(outcome);
    }

    let mut recovered = HashSet::new();
    let mut reporter = ProgressReporter::new(targets.len(), HarvestItemType::JournalUrls);

    for (i, (municipality, url)) in targets.iter().enumerate() {
        info!("{} Replaying forecast {} from {}", reporter.position(), municipality, url);
        let metrics = HarvestMetrics::start("forecast_replay", municipality.as_str());

        match fetcher.fetch_forecast_from(ctx, url, municipality).await {
            Ok(Some(record)) => {
                metrics.record_success(record.prediction.len());
                if dataset.upsert(record) {
                    outcome.stats.new_dates += 1;
                } else {
                    outcome.stats.refreshed_dates += 1;
                }
                outcome.stats.stations += 1;
                outcome.succeeded += 1;
                recovered.insert(url.clone());
            }
            Ok(None) => {
                metrics.record_empty();
                outcome.empty += 1;
                recovered.insert(url.clone());
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                outcome.failed += 1;
            }
        }

        reporter.advance();
        if i + 1 < targets.len() {
            tokio::time::sleep(request_delay).await;
        }
    }

    if recovered.is_empty() {
        warn!(failed = outcome.failed, "No journaled forecast recovered, journal left untouched");
        return Ok(outcome);
    }

    outcome.drained =
        journal.retain(|entry| entry.failed_url().map_or(true, |url| !recovered.contains(&url)))?;
    info!(
        recovered = outcome.recovered(),
        drained = outcome.drained,
        still_failing = outcome.failed,
        "Forecast replay finished"
    );
    Ok(outcome)
}

/// Drop journal entries of units that have since been fetched.
///
/// Returns the number of entries removed.
pub fn drain_recovered_units(journal: &ErrorJournal, units: &HashSet<String>) -> Result<usize, ResumeError> {
    if units.is_empty() {
        return Ok(0);
    }
    let drained = journal.retain(|entry| !units.contains(&entry.unit_id))?;
    if drained > 0 {
        info!(drained, path = %journal.path().display(), "Drained journal entries of refetched units");
    }
    Ok(drained)
}
