//! Main entry point for the portfolio-sync CLI

use clap::Parser;
use portfolio_sync::cli::{Cli, CliError, Commands};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_sync=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = portfolio_sync::metrics::init_metrics(addr).await {
            warn!("Metrics disabled: {}", e);
        }
    }

    let result = match cli.command {
        Commands::Sync(ref args) => args.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Endpoints(ref cmd) => cmd.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        if let Some(CliError::Api(api)) = e.downcast_ref::<CliError>() {
            eprintln!("Suggestion: {}", api.suggestion());
        }
        std::process::exit(1);
    }
}
