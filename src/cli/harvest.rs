//! Harvest commands: historical, forecast and replay

use crate::harvest::{HarvestExecutor, HarvestSummary};
use chrono::NaiveDate;
use clap::Args;
use serde_json::json;
use tracing::info;

use super::{Cli, CliError, OutputFormat};

/// Parse an end date in `YYYY-MM-DD` form.
pub fn parse_end_date(input: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| format!("'{input}' is not a YYYY-MM-DD date: {e}"))
}

/// Historical command arguments
#[derive(Args, Debug)]
pub struct HistoricalArgs {
    /// Last day to harvest (YYYY-MM-DD)
    #[arg(long, value_parser = parse_end_date)]
    pub end_date: NaiveDate,

    /// Only fetch groups that still have a station without data
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

impl HistoricalArgs {
    /// Run the historical harvest
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let executor = HarvestExecutor::from_config(cli.harvest_config()?)?;
        info!(end_date = %self.end_date, resume = self.resume, "Historical command");

        let report = executor
            .run_historical_harvest(self.end_date, self.resume)
            .await
            .ok_or(CliError::NoData("historical"))?;

        print_summary(
            cli.output_format,
            "Historical harvest",
            &report.summary,
            &[
                ("stations", report.dataset.len()),
                ("dates", report.dataset.date_count()),
            ],
        );
        Ok(())
    }
}

/// Forecast command arguments
#[derive(Args, Debug)]
pub struct ForecastArgs {
    /// Only fetch municipalities without a stored forecast
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

impl ForecastArgs {
    /// Run the forecast harvest
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let executor = HarvestExecutor::from_config(cli.harvest_config()?)?;

        let report = executor
            .run_forecast_harvest(self.resume)
            .await
            .ok_or(CliError::NoData("forecast"))?;

        print_summary(
            cli.output_format,
            "Forecast harvest",
            &report.summary,
            &[("municipalities", report.dataset.len())],
        );
        Ok(())
    }
}

/// Replay command arguments
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Replay the forecast journal instead of the historical one
    #[arg(long, default_value_t = false)]
    pub forecast: bool,
}

impl ReplayArgs {
    /// Replay an error journal.
    ///
    /// An empty journal or a pass that recovers nothing is not an error.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let executor = HarvestExecutor::from_config(cli.harvest_config()?)?;

        let (title, outcome) = if self.forecast {
            let report = executor.run_forecast_replay().await;
            ("Forecast replay", report.map(|r| (r.summary, ("municipalities", r.dataset.len()))))
        } else {
            let report = executor.run_error_replay().await;
            ("Error replay", report.map(|r| (r.summary, ("stations", r.dataset.len()))))
        };

        match outcome {
            Some((summary, total)) => print_summary(cli.output_format, title, &summary, &[total]),
            None => print_summary(cli.output_format, title, &HarvestSummary::default(), &[]),
        }
        Ok(())
    }
}

fn print_summary(format: OutputFormat, title: &str, summary: &HarvestSummary, totals: &[(&str, usize)]) {
    match format {
        OutputFormat::Json => {
            let mut output = json!({ "command": title, "summary": summary });
            for (name, value) in totals {
                output[*name] = json!(value);
            }
            println!("{output}");
        }
        OutputFormat::Human => {
            println!("\n{title} finished: {summary}");
            for (name, value) in totals {
                println!("  {name}: {value}");
            }
        }
    }
}
