//! Sync command implementation

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::output::{CsvRowSink, JsonHeaderStore, ProgressSink};
use crate::schema::ArrayMode;
use crate::sync::config::DEFAULT_CONCURRENCY;
use crate::sync::{ResourceOutcome, SyncError, SyncOrchestrator};
use crate::registry::EndpointRegistry;
use crate::EndpointDescriptor;

use super::{Cli, CliError, OutputFormat};

/// Maximum allowed concurrency; every resource shares one account-wide quota
const MAX_CONCURRENCY: usize = 8;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Sync command arguments
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Resource to sync (repeatable; default: all configured resources)
    #[arg(long = "resource")]
    pub resources: Vec<String>,

    /// Directory receiving one CSV per resource
    #[arg(long, default_value = "portfolio")]
    pub output_dir: PathBuf,

    /// Header mapping file (default: <output-dir>/headers.json)
    #[arg(long)]
    pub headers_file: Option<PathBuf>,

    /// Spread array values over numbered columns instead of joining them
    #[arg(long, default_value_t = false)]
    pub spread_arrays: bool,

    /// Number of resources synced concurrently (max: 8)
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,
}

/// Progress sink driving a terminal spinner
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressSink for SpinnerProgress {
    fn report(&self, resource_key: &str, message: &str) {
        self.bar.set_message(format!("{resource_key}: {message}"));
    }
}

impl SyncArgs {
    /// Resolve the requested resources against the registry
    fn select(&self, registry: &EndpointRegistry) -> Result<Vec<EndpointDescriptor>, CliError> {
        if self.resources.is_empty() {
            return Ok(registry.descriptors().to_vec());
        }

        let mut selected: Vec<EndpointDescriptor> = Vec::new();
        for key in &self.resources {
            let descriptor = registry.get(key).ok_or_else(|| {
                CliError::InvalidArgument(format!(
                    "Unknown resource '{key}'. Run the endpoints command to list resources."
                ))
            })?;
            if !selected.iter().any(|d| d.key == descriptor.key) {
                selected.push(descriptor.clone());
            }
        }
        Ok(selected)
    }

    /// Execute the sync command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let registry = Arc::new(cli.load_registry()?);
        let selected = self.select(&registry)?;
        let client = Arc::new(cli.build_client(Arc::clone(&registry))?);

        let headers_file = self
            .headers_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("headers.json"));
        let array_mode = if self.spread_arrays {
            ArrayMode::Spread
        } else {
            ArrayMode::Join
        };
        let spinner = Arc::new(SpinnerProgress::new(cli.output_format == OutputFormat::Human));

        let orchestrator = SyncOrchestrator::new(client)
            .with_header_store(Arc::new(JsonHeaderStore::new(&headers_file)))
            .with_progress(spinner.clone())
            .with_array_mode(array_mode);
        let sink = CsvRowSink::new(&self.output_dir);

        info!(
            resources = selected.len(),
            output_dir = %self.output_dir.display(),
            env = %cli.env,
            "Starting sync"
        );
        let outcomes = orchestrator
            .sync_many(&selected, self.concurrency, Some(&sink))
            .await;
        spinner.bar.finish_and_clear();

        match cli.output_format {
            OutputFormat::Json => output_json(&outcomes, &sink)?,
            OutputFormat::Human => output_human(&outcomes, &sink),
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            return Err(CliError::SyncFailed {
                failed,
                total: outcomes.len(),
            });
        }
        Ok(())
    }
}

fn suggestion(err: &SyncError) -> &'static str {
    match err {
        SyncError::Api(api) => api.suggestion(),
        SyncError::Output(_) => "Check that the output directory is writable",
    }
}

/// Output results as JSON
fn output_json(outcomes: &[ResourceOutcome], sink: &CsvRowSink) -> Result<(), CliError> {
    let resources: Vec<_> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(report) => json!({
                "resource": outcome.resource_key,
                "success": true,
                "items": report.item_count,
                "rows": report.rows.len(),
                "columns": report.columns.len(),
                "output_path": sink.path_for(&outcome.resource_key).display().to_string(),
                "added_fields": report.header_diff.added,
                "removed_fields": report.header_diff.removed,
            }),
            Err(err) => json!({
                "resource": outcome.resource_key,
                "success": false,
                "error": err.to_string(),
                "error_kind": err.kind(),
                "suggestion": suggestion(err),
            }),
        })
        .collect();

    let output = json!({ "resources": resources });
    println!(
        "{}",
        serde_json::to_string(&output).map_err(|e| CliError::ConfigurationError(e.to_string()))?
    );
    Ok(())
}

/// Output results in human-readable format
fn output_human(outcomes: &[ResourceOutcome], sink: &CsvRowSink) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                println!(
                    "[OK] {}: {} rows, {} columns -> {}",
                    outcome.resource_key,
                    report.rows.len(),
                    report.columns.len(),
                    sink.path_for(&outcome.resource_key).display()
                );
                if !report.header_diff.added.is_empty() {
                    println!("     new fields not in stored columns: {}", report.header_diff.added.join(", "));
                }
                if !report.header_diff.removed.is_empty() {
                    println!("     stored columns no longer returned: {}", report.header_diff.removed.join(", "));
                }
            }
            Err(err) => {
                eprintln!("[FAILED] {}: {err}", outcome.resource_key);
                eprintln!("     Suggestion: {}", suggestion(err));
            }
        }
    }
}
