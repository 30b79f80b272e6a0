//! Harvest orchestration, retry and pacing
//!
//! This module drives work units through the fetcher and persists what comes
//! back.
//!
//! # Overview
//!
//! Every run walks the same state machine:
//!
//! ```text
//! INIT → LOAD_PROGRESS → FOR_EACH_UNIT{FETCH → (MERGE | JOURNAL_ERROR) → CHECKPOINT → PACE} → FINALIZE → DONE
//! ```
//!
//! 1. **Units**: station groups or municipality codes from the code files
//! 2. **Fetch**: [`crate::fetcher::WeatherFetcher`] under the [`retry::RetryPolicy`]
//! 3. **Merge**: idempotent union into the checkpoint ([`merge`])
//! 4. **Journal**: terminal failures go to the error journal
//! 5. **Finalize**: fold into the durable dataset and delete the checkpoint
//!
//! # Components
//!
//! - [`executor`] - Entry points: historical, forecast and the journal replays
//! - [`retry`] - Outcome classification and the retry table
//! - [`pacing`] - Minimum gap between outbound requests
//! - [`merge`] - Dataset reconciliation
//! - [`recovery`] - Continuation filters and error replay
//! - [`config`] - Constants and runtime settings
//! - [`progress`] - `[i/N]` progress lines

pub mod config;
pub mod executor;
pub mod merge;
pub mod pacing;
pub mod progress;
pub mod recovery;
pub mod retry;

pub use config::HarvestConfig;
pub use executor::HarvestExecutor;
pub use merge::MergeStats;
pub use pacing::HarvestContext;
pub use retry::{Outcome, RetryDecision, RetryPolicy};

use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::registry::RegistryError;
use crate::resume::ResumeError;
use crate::WindowError;
use std::fmt;

/// Run-level failures. Entry points log them and return `None`.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Code file missing or invalid
    #[error("code file error: {0}")]
    Registry(#[from] RegistryError),

    /// Durable dataset unreadable or unwritable
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Journal unreadable
    #[error("journal error: {0}")]
    Journal(#[from] ResumeError),

    /// Client could not be built
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// End date before start date
    #[error("invalid harvest window: {0}")]
    InvalidWindow(#[from] WindowError),
}

/// Result type for harvest runs
pub type HarvestResult<T> = Result<T, HarvestError>;

/// State of the harvest state machine, attached to spans and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    /// Resolve work units
    Init,
    /// Read the checkpoint
    LoadProgress,
    /// Call the fetcher
    Fetch,
    /// Merge records into progress
    Merge,
    /// Record a terminal failure
    JournalError,
    /// Save the checkpoint
    Checkpoint,
    /// Sleep between units
    Pace,
    /// Write the durable dataset
    Finalize,
    /// Run complete
    Done,
}

impl HarvestPhase {
    /// Upper-case name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::LoadProgress => "LOAD_PROGRESS",
            Self::Fetch => "FETCH",
            Self::Merge => "MERGE",
            Self::JournalError => "JOURNAL_ERROR",
            Self::Checkpoint => "CHECKPOINT",
            Self::Pace => "PACE",
            Self::Finalize => "FINALIZE",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counts of one run, as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HarvestSummary {
    /// Units scheduled
    pub total_units: usize,
    /// Units that returned data
    pub succeeded: usize,
    /// Units that returned no data
    pub empty: usize,
    /// Units journaled as failed
    pub failed: usize,
    /// New (station, date) pairs in the durable dataset; for forecasts,
    /// municipalities stored for the first time
    pub new_dates: usize,
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} units: {} succeeded, {} empty, {} failed, {} new",
            self.total_units, self.succeeded, self.empty, self.failed, self.new_dates
        )
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport<D> {
    /// Durable dataset after the run
    pub dataset: D,
    /// Counts
    pub summary: HarvestSummary,
}
