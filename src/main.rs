//! Main entry point for the aemet-harvester CLI

use aemet_harvester::cli::{Cli, Commands};
use aemet_harvester::metrics;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aemet_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    // .env is optional; a real environment variable wins
    let dotenv = dotenvy::dotenv();

    init_tracing();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr) {
            warn!(error = %e, "Metrics exporter not started");
        }
    }

    let result = match &cli.command {
        Commands::Historical(args) => args.execute(&cli).await,
        Commands::Forecast(args) => args.execute(&cli).await,
        Commands::Replay(args) => args.execute(&cli).await,
        Commands::GroupCodes(args) => args.execute(&cli).await,
        Commands::Pending(args) => args.execute(&cli).await,
    }
    .map_err(|e| anyhow::anyhow!(e));

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
