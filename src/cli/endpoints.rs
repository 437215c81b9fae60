//! CLI command for listing configured endpoints

use clap::Args;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};

/// Endpoints subcommand
#[derive(Debug, Args)]
pub struct EndpointsCommand {}

impl EndpointsCommand {
    /// Print every configured endpoint with its rate limit and cache TTL
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let registry = cli.load_registry()?;

        match cli.output_format {
            OutputFormat::Json => {
                let endpoints: Vec<_> = registry
                    .descriptors()
                    .iter()
                    .map(|d| {
                        json!({
                            "key": d.key,
                            "path": d.path,
                            "max_requests": d.rate_limit.max_requests,
                            "window_ms": d.rate_limit.window_ms,
                            "cache_ttl_secs": d.cache_ttl_secs,
                            "paginated": d.paginated,
                        })
                    })
                    .collect();
                let output = json!({
                    "schema_version": registry.schema_version(),
                    "endpoints": endpoints,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output)
                        .map_err(|e| CliError::ConfigurationError(e.to_string()))?
                );
            }
            OutputFormat::Human => {
                println!("Found {} endpoints:\n", registry.descriptors().len());
                for d in registry.descriptors() {
                    let cache = d
                        .cache_ttl_secs
                        .map(|ttl| format!("cache {ttl}s"))
                        .unwrap_or_else(|| "no cache".to_string());
                    let paging = if d.paginated { ", paginated" } else { "" };
                    println!(
                        "  {:<14} {:<30} {} req / {:.1}s, {cache}{paging}",
                        d.key,
                        d.path,
                        d.rate_limit.max_requests,
                        d.rate_limit.window().as_secs_f64(),
                    );
                }
            }
        }
        Ok(())
    }
}
