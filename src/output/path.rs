//! File layout of a harvester data root
//!
//! All inputs, checkpoints and outputs live in two directories:
//!
//! ```text
//! json/
//!   ema_codes.json            station name -> code (input to group-codes)
//!   codes_group.json          group name -> "c1,c2,..."
//!   towns_codes.json          municipality code -> town
//!   progress.json             historical checkpoint
//!   prediction_progress.json  forecast checkpoint
//!   weather_data.json         durable historical dataset
//!   prediction_data.json      durable forecast dataset
//!   pending_group_codes.json  groups still missing stations
//!   pending_towns_codes.json  municipalities without a forecast
//! error_journal/
//!   errors.json               historical error journal
//!   forecast_errors.json      forecast error journal
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use aemet_harvester::output::DataLayout;
//! use std::path::Path;
//!
//! let layout = DataLayout::under("data");
//! assert_eq!(layout.historical_dataset(), Path::new("data/json/weather_data.json"));
//! assert_eq!(layout.historical_journal(), Path::new("data/error_journal/errors.json"));
//! ```

use super::{OutputError, OutputResult};
use std::path::{Path, PathBuf};

/// Default name of the JSON directory
pub const JSON_DIR: &str = "json";

/// Default name of the journal directory
pub const JOURNAL_DIR: &str = "error_journal";

/// Resolved paths for one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    json_dir: PathBuf,
    journal_dir: PathBuf,
}

impl DataLayout {
    /// Layout with explicit directories
    pub fn new(json_dir: impl Into<PathBuf>, journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: json_dir.into(),
            journal_dir: journal_dir.into(),
        }
    }

    /// Layout with `json/` and `error_journal/` under `root`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join(JSON_DIR), root.join(JOURNAL_DIR))
    }

    /// Directory holding code files, checkpoints and datasets
    pub fn json_dir(&self) -> &Path {
        &self.json_dir
    }

    /// Directory holding error journals
    pub fn journal_dir(&self) -> &Path {
        &self.journal_dir
    }

    /// Station catalog (`{name: code}`)
    pub fn station_catalog(&self) -> PathBuf {
        self.json_dir.join("ema_codes.json")
    }

    /// Station groups (`{group: "c1,c2"}`)
    pub fn station_groups(&self) -> PathBuf {
        self.json_dir.join("codes_group.json")
    }

    /// Municipality codes (`{code: town}`)
    pub fn towns(&self) -> PathBuf {
        self.json_dir.join("towns_codes.json")
    }

    /// Historical checkpoint
    pub fn historical_checkpoint(&self) -> PathBuf {
        self.json_dir.join("progress.json")
    }

    /// Forecast checkpoint
    pub fn forecast_checkpoint(&self) -> PathBuf {
        self.json_dir.join("prediction_progress.json")
    }

    /// Durable historical dataset
    pub fn historical_dataset(&self) -> PathBuf {
        self.json_dir.join("weather_data.json")
    }

    /// Durable forecast dataset
    pub fn forecast_dataset(&self) -> PathBuf {
        self.json_dir.join("prediction_data.json")
    }

    /// Station groups with at least one station not yet stored
    pub fn pending_groups(&self) -> PathBuf {
        self.json_dir.join("pending_group_codes.json")
    }

    /// Municipalities without a stored forecast
    pub fn pending_towns(&self) -> PathBuf {
        self.json_dir.join("pending_towns_codes.json")
    }

    /// Historical error journal
    pub fn historical_journal(&self) -> PathBuf {
        self.journal_dir.join("errors.json")
    }

    /// Forecast error journal
    pub fn forecast_journal(&self) -> PathBuf {
        self.journal_dir.join("forecast_errors.json")
    }

    /// Create both directories if missing
    pub fn ensure_dirs(&self) -> OutputResult<()> {
        for dir in [&self.json_dir, &self.journal_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                OutputError::IoError(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(JSON_DIR, JOURNAL_DIR)
    }
}
