//! Code file commands: grouping the station catalog and listing pending work

use crate::harvest::config::STATION_GROUP_SIZE;
use crate::harvest::merge::{fold_dataset, fold_forecasts};
use crate::harvest::recovery::{pending_station_groups, pending_towns};
use crate::output::{DataLayout, DatasetFile};
use crate::registry::{self, RegistryError};
use crate::resume::{ForecastProgress, HistoricalProgress, ProgressStore};
use crate::{ForecastDataset, HistoricalDataset, WorkUnit};
use clap::Args;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use super::{Cli, CliError, OutputFormat};

/// Parse and validate a group size
fn parse_group_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("group size must be at least 1".to_string());
    }
    Ok(value)
}

/// Group-codes command arguments
#[derive(Args, Debug)]
pub struct GroupCodesArgs {
    /// Stations per group
    #[arg(long, default_value_t = STATION_GROUP_SIZE, value_parser = parse_group_size)]
    pub group_size: usize,
}

impl GroupCodesArgs {
    /// Write `codes_group.json` from `ema_codes.json`
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let layout = cli.layout();
        layout.ensure_dirs()?;

        let codes = registry::load_station_catalog(&layout.station_catalog())?;
        let groups = registry::group_station_codes(&codes, self.group_size);
        registry::write_map(&layout.station_groups(), &groups)?;
        info!(
            stations = codes.len(),
            groups = groups.len(),
            path = %layout.station_groups().display(),
            "Wrote station groups"
        );

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                json!({ "stations": codes.len(), "groups": groups.len() })
            ),
            OutputFormat::Human => println!(
                "Grouped {} stations into {} groups: {}",
                codes.len(),
                groups.len(),
                layout.station_groups().display()
            ),
        }
        Ok(())
    }
}

/// Pending command arguments
#[derive(Args, Debug)]
pub struct PendingArgs {}

impl PendingArgs {
    /// Write the pending station groups and municipalities without fetching
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let layout = cli.layout();
        layout.ensure_dirs()?;

        let groups = write_pending_groups(&layout)?;
        let towns = write_pending_towns(&layout)?;

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                json!({ "pending_groups": groups, "pending_towns": towns })
            ),
            OutputFormat::Human => {
                println!("Pending station groups: {}", fmt_count(groups));
                println!("Pending municipalities: {}", fmt_count(towns));
            }
        }
        Ok(())
    }
}

fn fmt_count(count: Option<usize>) -> String {
    count.map_or_else(|| "no code file".to_string(), |n| n.to_string())
}

/// Code file units, or `None` with a warning when the file does not exist.
fn load_optional(
    path: &Path,
    load: fn(&Path) -> Result<Vec<WorkUnit>, RegistryError>,
) -> Result<Option<Vec<WorkUnit>>, CliError> {
    match load(path) {
        Ok(units) => Ok(Some(units)),
        Err(RegistryError::NotFound(_)) => {
            warn!(path = %path.display(), "Code file not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_pending_groups(layout: &DataLayout) -> Result<Option<usize>, CliError> {
    let Some(groups) = load_optional(&layout.station_groups(), registry::load_station_groups)? else {
        return Ok(None);
    };

    let mut known = DatasetFile::<HistoricalDataset>::new(layout.historical_dataset()).load()?;
    let progress = ProgressStore::<HistoricalProgress>::new(layout.historical_checkpoint()).load();
    fold_dataset(&mut known, &progress.stations_data);

    let pending = pending_station_groups(&groups, &known);
    registry::write_code_file(&layout.pending_groups(), &pending)?;
    Ok(Some(pending.len()))
}

fn write_pending_towns(layout: &DataLayout) -> Result<Option<usize>, CliError> {
    let Some(towns) = load_optional(&layout.towns(), registry::load_towns)? else {
        return Ok(None);
    };

    let mut known = DatasetFile::<ForecastDataset>::new(layout.forecast_dataset()).load()?;
    let progress = ProgressStore::<ForecastProgress>::new(layout.forecast_checkpoint()).load();
    fold_forecasts(&mut known, &progress.forecasts);

    let pending = pending_towns(&towns, &known);
    registry::write_code_file(&layout.pending_towns(), &pending)?;
    Ok(Some(pending.len()))
}
