//! Harvest executor with checkpointing and error journaling
//!
//! One executor serves every entry point. Each run loads its work
//! units, walks them one at a time through the fetcher, saves the checkpoint
//! as it goes and folds the harvested data into the durable dataset at the
//! end.

use crate::fetcher::aemet::AemetFetcher;
use crate::fetcher::{FetcherError, WeatherFetcher};
use crate::harvest::merge::{fold_dataset, fold_forecasts, merge_into_progress};
use crate::harvest::progress::{HarvestItemType, ProgressReporter};
use crate::harvest::recovery::{
    drain_recovered_units, pending_station_groups, pending_towns, replay_forecast_journal, replay_journal,
};
use crate::harvest::{
    HarvestConfig, HarvestContext, HarvestPhase, HarvestReport, HarvestResult, HarvestSummary,
};
use crate::identifier::WorkUnit;
use crate::metrics::HarvestMetrics;
use crate::output::DatasetFile;
use crate::registry;
use crate::resume::{ErrorJournal, ForecastProgress, HistoricalProgress, JournalEntry, ProgressStore};
use crate::{ForecastDataset, HarvestWindow, HistoricalDataset};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Orchestrates harvests against one fetcher.
#[derive(Clone)]
pub struct HarvestExecutor {
    config: HarvestConfig,
    fetcher: Arc<dyn WeatherFetcher>,
    ctx: Arc<HarvestContext>,
}

impl fmt::Debug for HarvestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestExecutor")
            .field("base_url", &self.fetcher.base_url())
            .field("layout", &self.config.layout)
            .finish()
    }
}

impl HarvestExecutor {
    /// Executor over any fetcher
    pub fn new(config: HarvestConfig, fetcher: Arc<dyn WeatherFetcher>) -> Self {
        let ctx = Arc::new(HarvestContext::new(config.min_request_gap));
        Self {
            config,
            fetcher,
            ctx,
        }
    }

    /// Executor over the AEMET fetcher built from `config`
    pub fn from_config(config: HarvestConfig) -> HarvestResult<Self> {
        let fetcher = AemetFetcher::from_config(&config)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    /// Harvest settings
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Shared pacing context
    pub fn context(&self) -> &HarvestContext {
        &self.ctx
    }

    /// Harvest daily climatology for every station group from the configured
    /// start date to `end_date`.
    ///
    /// With `resume`, only groups that still have a station without stored
    /// data are fetched. Returns `None` when the run could not start or
    /// nothing at all is stored afterwards.
    pub async fn run_historical_harvest(
        &self,
        end_date: NaiveDate,
        resume: bool,
    ) -> Option<HarvestReport<HistoricalDataset>> {
        let span = info_span!("historical_harvest", end_date = %end_date, resume);
        match self.historical(end_date, resume).instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Historical harvest failed");
                None
            }
        }
    }

    /// Harvest the seven-day forecast of every municipality.
    ///
    /// With `resume`, municipalities already stored are skipped. Forecast
    /// journal entries of municipalities fetched in this run are drained.
    pub async fn run_forecast_harvest(&self, resume: bool) -> Option<HarvestReport<ForecastDataset>> {
        let span = info_span!("forecast_harvest", resume);
        match self.forecast(resume).instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Forecast harvest failed");
                None
            }
        }
    }

    /// Re-issue every URL in the historical error journal.
    ///
    /// Returns `None` when the journal is empty or no URL was recovered.
    pub async fn run_error_replay(&self) -> Option<HarvestReport<HistoricalDataset>> {
        let span = info_span!("error_replay");
        match self.replay().instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Error replay failed");
                None
            }
        }
    }

    /// Re-issue every URL in the forecast error journal.
    ///
    /// Returns `None` when the journal is empty or no URL was recovered.
    pub async fn run_forecast_replay(&self) -> Option<HarvestReport<ForecastDataset>> {
        let span = info_span!("forecast_replay");
        match self.forecast_replay().instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Forecast replay failed");
                None
            }
        }
    }

    async fn historical(
        &self,
        end_date: NaiveDate,
        resume: bool,
    ) -> HarvestResult<Option<HarvestReport<HistoricalDataset>>> {
        let layout = &self.config.layout;
        let window = HarvestWindow::new(self.config.start_date, end_date)?;
        layout.ensure_dirs()?;

        info!(phase = %HarvestPhase::Init, start = %window.start, end = %window.end, "Starting historical harvest");
        let groups = registry::load_station_groups(&layout.station_groups())?;
        let dataset_file = DatasetFile::<HistoricalDataset>::new(layout.historical_dataset());
        let durable = dataset_file.load()?;

        let store = ProgressStore::<HistoricalProgress>::new(layout.historical_checkpoint());
        let mut progress = store.load();
        info!(
            phase = %HarvestPhase::LoadProgress,
            stations = progress.stations_data.len(),
            processed_dates = progress.processed_count(),
            "Loaded checkpoint"
        );

        let units = if resume {
            let mut known = durable.clone();
            fold_dataset(&mut known, &progress.stations_data);
            pending_station_groups(&groups, &known)
        } else {
            groups
        };

        let journal = ErrorJournal::new(layout.historical_journal());
        let mut summary = HarvestSummary {
            total_units: units.len(),
            ..Default::default()
        };
        let mut reporter = ProgressReporter::new(units.len(), HarvestItemType::StationGroups);

        for (i, unit) in units.iter().enumerate() {
            let span = info_span!("unit", group = %unit.label(), stations = %unit.id());
            self.historical_unit(window, unit, &reporter, &mut progress, &journal, &mut summary)
                .instrument(span)
                .await;
            reporter.advance();
            self.after_unit(&store, &progress, i, units.len(), &reporter).await;
        }

        info!(phase = %HarvestPhase::Finalize, "{}", summary);
        let mut dataset = durable;
        let stats = fold_dataset(&mut dataset, &progress.stations_data);
        summary.new_dates = stats.new_dates;

        if dataset.is_empty() {
            warn!("No data obtained and no stored dataset, nothing written");
            self.clear_checkpoint(&store);
            return Ok(None);
        }
        if !progress.is_empty() {
            dataset_file.save(&dataset)?;
        }
        self.clear_checkpoint(&store);

        info!(
            phase = %HarvestPhase::Done,
            stations = dataset.len(),
            dates = dataset.date_count(),
            new_dates = stats.new_dates,
            "Historical harvest complete"
        );
        Ok(Some(HarvestReport { dataset, summary }))
    }

    async fn historical_unit(
        &self,
        window: HarvestWindow,
        unit: &WorkUnit,
        reporter: &ProgressReporter,
        progress: &mut HistoricalProgress,
        journal: &ErrorJournal,
        summary: &mut HarvestSummary,
    ) {
        info!(phase = %HarvestPhase::Fetch, "{} Fetching {}", reporter.position(), unit);
        let metrics = HarvestMetrics::start("historical", unit.id());

        match self.fetcher.fetch_observations(&self.ctx, window, unit).await {
            Ok(records) if records.is_empty() => {
                warn!("No observations returned");
                metrics.record_empty();
                summary.empty += 1;
            }
            Ok(records) => {
                let count = records.len();
                let stats = merge_into_progress(progress, records);
                info!(
                    phase = %HarvestPhase::Merge,
                    records = count,
                    new_dates = stats.new_dates,
                    refreshed_dates = stats.refreshed_dates,
                    stations = stats.stations,
                    "Merged observations"
                );
                metrics.record_success(count);
                summary.succeeded += 1;
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                summary.failed += 1;
                let fallback = self.fetcher.observations_url(window, unit);
                record_failure(journal, unit, &fallback, &e);
            }
        }
    }

    async fn forecast(&self, resume: bool) -> HarvestResult<Option<HarvestReport<ForecastDataset>>> {
        let layout = &self.config.layout;
        layout.ensure_dirs()?;

        info!(phase = %HarvestPhase::Init, "Starting forecast harvest");
        let towns = registry::load_towns(&layout.towns())?;
        let dataset_file = DatasetFile::<ForecastDataset>::new(layout.forecast_dataset());
        let durable = dataset_file.load()?;

        let store = ProgressStore::<ForecastProgress>::new(layout.forecast_checkpoint());
        let mut progress = store.load();
        info!(
            phase = %HarvestPhase::LoadProgress,
            forecasts = progress.forecasts.len(),
            "Loaded checkpoint"
        );

        let units = if resume {
            let mut known = durable.clone();
            fold_forecasts(&mut known, &progress.forecasts);
            pending_towns(&towns, &known)
        } else {
            towns
        };

        let journal = ErrorJournal::new(layout.forecast_journal());
        let mut summary = HarvestSummary {
            total_units: units.len(),
            ..Default::default()
        };
        let mut reporter = ProgressReporter::new(units.len(), HarvestItemType::Municipalities);
        let mut refetched = HashSet::new();

        for (i, unit) in units.iter().enumerate() {
            let span = info_span!("unit", municipality = %unit.id(), town = %unit.label());
            let stored = self
                .forecast_unit(unit, &reporter, &mut progress, &journal, &mut summary)
                .instrument(span)
                .await;
            if stored {
                refetched.insert(unit.id().to_string());
            }
            reporter.advance();
            self.after_unit(&store, &progress, i, units.len(), &reporter).await;
        }

        info!(phase = %HarvestPhase::Finalize, "{}", summary);
        let mut dataset = durable;
        summary.new_dates = fold_forecasts(&mut dataset, &progress.forecasts);

        if dataset.is_empty() {
            warn!("No forecasts obtained and no stored dataset, nothing written");
            self.clear_checkpoint(&store);
            return Ok(None);
        }
        if !progress.is_empty() {
            dataset_file.save(&dataset)?;
        }
        if let Err(e) = drain_recovered_units(&journal, &refetched) {
            warn!(error = %e, path = %journal.path().display(), "Could not drain forecast journal");
        }
        self.clear_checkpoint(&store);

        info!(
            phase = %HarvestPhase::Done,
            municipalities = dataset.len(),
            new = summary.new_dates,
            "Forecast harvest complete"
        );
        Ok(Some(HarvestReport { dataset, summary }))
    }

    async fn forecast_unit(
        &self,
        unit: &WorkUnit,
        reporter: &ProgressReporter,
        progress: &mut ForecastProgress,
        journal: &ErrorJournal,
        summary: &mut HarvestSummary,
    ) -> bool {
        info!(phase = %HarvestPhase::Fetch, "{} Fetching forecast for {}", reporter.position(), unit);
        let metrics = HarvestMetrics::start("forecast", unit.id());

        match self.fetcher.fetch_forecast(&self.ctx, unit).await {
            Ok(Some(record)) => {
                let days = record.prediction.len();
                progress.forecasts.upsert(record);
                debug!(phase = %HarvestPhase::Merge, days, "Stored forecast");
                metrics.record_success(days);
                summary.succeeded += 1;
                true
            }
            Ok(None) => {
                warn!("No forecast returned");
                metrics.record_empty();
                summary.empty += 1;
                false
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                summary.failed += 1;
                let fallback = self.fetcher.forecast_url(unit);
                record_failure(journal, unit, &fallback, &e);
                false
            }
        }
    }

    async fn replay(&self) -> HarvestResult<Option<HarvestReport<HistoricalDataset>>> {
        let layout = &self.config.layout;
        layout.ensure_dirs()?;

        let journal = ErrorJournal::new(layout.historical_journal());
        if journal.is_empty()? {
            info!(path = %journal.path().display(), "Error journal is empty, nothing to replay");
            return Ok(None);
        }

        let dataset_file = DatasetFile::<HistoricalDataset>::new(layout.historical_dataset());
        let mut dataset = dataset_file.load()?;
        let outcome = replay_journal(
            self.fetcher.as_ref(),
            &self.ctx,
            &journal,
            &mut dataset,
            self.config.request_delay,
        )
        .await?;

        if outcome.recovered() == 0 {
            warn!(failed = outcome.failed, "Error replay recovered nothing");
            return Ok(None);
        }
        if outcome.stats.new_dates > 0 || outcome.stats.refreshed_dates > 0 {
            dataset_file.save(&dataset)?;
        }

        let summary = HarvestSummary {
            total_units: outcome.attempted,
            succeeded: outcome.succeeded,
            empty: outcome.empty,
            failed: outcome.failed,
            new_dates: outcome.stats.new_dates,
        };
        info!(phase = %HarvestPhase::Done, "Error replay: {}", summary);
        Ok(Some(HarvestReport { dataset, summary }))
    }

    async fn forecast_replay(&self) -> HarvestResult<Option<HarvestReport<ForecastDataset>>> {
        let layout = &self.config.layout;
        layout.ensure_dirs()?;

        let journal = ErrorJournal::new(layout.forecast_journal());
        if journal.is_empty()? {
            info!(path = %journal.path().display(), "Forecast journal is empty, nothing to replay");
            return Ok(None);
        }

        let dataset_file = DatasetFile::<ForecastDataset>::new(layout.forecast_dataset());
        let mut dataset = dataset_file.load()?;
        let outcome = replay_forecast_journal(
            self.fetcher.as_ref(),
            &self.ctx,
            &journal,
            &mut dataset,
            self.config.request_delay,
        )
        .await?;

        if outcome.recovered() == 0 {
            warn!(failed = outcome.failed, "Forecast replay recovered nothing");
            return Ok(None);
        }
        if outcome.succeeded > 0 {
            dataset_file.save(&dataset)?;
        }

        let summary = HarvestSummary {
            total_units: outcome.attempted,
            succeeded: outcome.succeeded,
            empty: outcome.empty,
            failed: outcome.failed,
            new_dates: outcome.stats.new_dates,
        };
        info!(phase = %HarvestPhase::Done, "Forecast replay: {}", summary);
        Ok(Some(HarvestReport { dataset, summary }))
    }

    /// CHECKPOINT then PACE for unit `index` of `total`.
    async fn after_unit<S>(
        &self,
        store: &ProgressStore<S>,
        progress: &S,
        index: usize,
        total: usize,
        reporter: &ProgressReporter,
    ) where
        S: Serialize + DeserializeOwned + Default,
    {
        let last = index + 1 == total;
        if self.config.is_checkpoint_due(index, total) {
            match store.save(progress) {
                Ok(()) => debug!(phase = %HarvestPhase::Checkpoint, path = %store.path().display(), "Checkpoint saved"),
                Err(e) => error!(
                    phase = %HarvestPhase::Checkpoint,
                    error = %e,
                    "PersistenceFailure: checkpoint not saved, continuing"
                ),
            }
        }
        info!("{}", reporter.format_progress());

        if !last {
            debug!(phase = %HarvestPhase::Pace, delay_ms = self.config.request_delay.as_millis() as u64, "Pacing");
            tokio::time::sleep(self.config.request_delay).await;
        }
    }

    fn clear_checkpoint<S>(&self, store: &ProgressStore<S>)
    where
        S: Serialize + DeserializeOwned + Default,
    {
        if let Err(e) = store.clear() {
            warn!(error = %e, path = %store.path().display(), "Failed to remove checkpoint");
        }
    }
}

/// Journal a unit whose fetch failed for good.
///
/// The URL is the one that failed (the data URL when the second call broke),
/// falling back to the unit's envelope URL.
fn record_failure(journal: &ErrorJournal, unit: &WorkUnit, fallback_url: &str, err: &FetcherError) {
    let url = err.url().unwrap_or(fallback_url).to_string();
    error!(
        phase = %HarvestPhase::JournalError,
        url = %url,
        error = %err,
        "Unit failed, journaling"
    );
    let entry = JournalEntry::new(unit.id(), Some(url), err.to_string());
    if let Err(e) = journal.append(entry) {
        error!(error = %e, path = %journal.path().display(), "PersistenceFailure: journal entry lost");
    }
}
