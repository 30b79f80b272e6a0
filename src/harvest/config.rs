//! Harvest configuration constants and runtime settings

use crate::output::DataLayout;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum attempts per outbound call, the first one included.
pub const MAX_ATTEMPTS: u32 = 5;

/// Wait after a rate limit when the server does not advise one.
/// The upstream quota window is one minute.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(61);

/// Lower bound of the exponential backoff for transient faults.
pub const BACKOFF_MIN: Duration = Duration::from_secs(4);

/// Upper bound of the exponential backoff for transient faults.
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Maximum uniform jitter added to a transient backoff.
pub const MAX_JITTER: Duration = Duration::from_secs(3);

/// Sleep between work units.
pub const REQUEST_DELAY: Duration = Duration::from_secs(3);

/// Minimum gap between two outbound requests.
pub const MIN_REQUEST_GAP: Duration = Duration::from_secs(1);

/// Save the checkpoint every N units.
pub const CHECKPOINT_EVERY: usize = 1;

/// Station codes per work unit when grouping the station catalog.
pub const STATION_GROUP_SIZE: usize = 25;

/// Connect timeout of the HTTP client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout of the HTTP client.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// First day of every historical window.
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

/// Exponential backoff for the given 1-based attempt, before jitter.
///
/// `2^(attempt-1)` seconds, raised to `min` and capped at `max`.
pub fn calculate_backoff(attempt: u32, min: Duration, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exp).max(min).min(max)
}

/// Runtime settings of a harvest.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// AEMET OpenData API key
    pub api_key: String,
    /// Upstream base URL
    pub base_url: String,
    /// File layout
    pub layout: DataLayout,
    /// First day of the historical window
    pub start_date: NaiveDate,
    /// Sleep between units
    pub request_delay: Duration,
    /// Minimum gap between outbound requests
    pub min_request_gap: Duration,
    /// Save the checkpoint every N units, never 0
    checkpoint_every: usize,
    /// Attempts per outbound call
    pub max_attempts: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
}

impl HarvestConfig {
    /// Settings with defaults for everything but the key and directories
    pub fn new(
        api_key: impl Into<String>,
        json_dir: impl Into<PathBuf>,
        journal_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: crate::fetcher::aemet_config::AEMET_BASE_URL.to_string(),
            layout: DataLayout::new(json_dir, journal_dir),
            start_date: default_start_date(),
            request_delay: REQUEST_DELAY,
            min_request_gap: MIN_REQUEST_GAP,
            checkpoint_every: CHECKPOINT_EVERY,
            max_attempts: MAX_ATTEMPTS,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Use a different upstream base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a different file layout
    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Override the first day of the historical window
    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    /// Override the pacing delays
    pub fn with_pacing(mut self, request_delay: Duration, min_request_gap: Duration) -> Self {
        self.request_delay = request_delay;
        self.min_request_gap = min_request_gap;
        self
    }

    /// Override the checkpoint cadence (clamped to at least 1)
    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    /// Checkpoint cadence in units
    pub fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    /// Whether the checkpoint is saved after unit `index` (0-based) of `total`.
    ///
    /// Always true after the last unit.
    pub fn is_checkpoint_due(&self, index: usize, total: usize) -> bool {
        index + 1 == total || (index + 1) % self.checkpoint_every.max(1) == 0
    }

    /// Override the attempt ceiling (clamped to at least 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the HTTP timeouts
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }
}
