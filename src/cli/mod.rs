//! CLI command implementations

pub mod codes;
pub mod error;
pub mod harvest;

pub use codes::{GroupCodesArgs, PendingArgs};
pub use error::CliError;
pub use harvest::{ForecastArgs, HistoricalArgs, ReplayArgs};

use crate::harvest::config::{MAX_ATTEMPTS, REQUEST_DELAY};
use crate::harvest::HarvestConfig;
use crate::output::DataLayout;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line of the harvester
#[derive(Parser, Debug)]
#[command(name = "aemet-harvester")]
#[command(about = "Resumable harvester for AEMET OpenData climatology and forecasts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Root holding the `json/` and `error_journal/` directories
    #[arg(long, global = true, default_value = ".")]
    pub data_dir: PathBuf,

    /// AEMET OpenData API key
    #[arg(long, global = true, env = "AEMET_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Upstream base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Attempts per outbound call (range: 1-20)
    #[arg(long, global = true, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Sleep between work units, in seconds
    #[arg(long, global = true, default_value_t = REQUEST_DELAY.as_secs())]
    pub request_delay_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest daily climatology for every station group
    Historical(HistoricalArgs),

    /// Harvest the seven-day forecast of every municipality
    Forecast(ForecastArgs),

    /// Re-issue the URLs recorded in an error journal
    Replay(ReplayArgs),

    /// Split the station catalog into groups of 25
    GroupCodes(GroupCodesArgs),

    /// Write the station groups and municipalities still missing data
    Pending(PendingArgs),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl Cli {
    /// File layout under `--data-dir`
    pub fn layout(&self) -> DataLayout {
        DataLayout::under(&self.data_dir)
    }

    /// Harvest settings from the global flags.
    ///
    /// # Errors
    /// Fails when no API key was given by flag or environment.
    pub fn harvest_config(&self) -> Result<HarvestConfig, CliError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(
                    "AEMET API key missing: pass --api-key or set AEMET_API_KEY".to_string(),
                )
            })?;

        let layout = self.layout();
        let mut config = HarvestConfig::new(api_key, layout.json_dir(), layout.journal_dir())
            .with_max_attempts(self.max_attempts);
        config.request_delay = Duration::from_secs(self.request_delay_secs);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.trim_end_matches('/'));
        }
        Ok(config)
    }
}
