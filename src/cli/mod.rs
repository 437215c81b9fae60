//! CLI command implementations

pub mod endpoints;
pub mod error;
pub mod sync;

pub use endpoints::EndpointsCommand;
pub use error::CliError;
pub use sync::SyncArgs;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::api::credentials::{Environment, StaticCredentials, API_KEY_ENV, ENVIRONMENT_ENV};
use crate::api::transport::ReqwestTransport;
use crate::api::{ApiClient, ConfigError};
use crate::registry::EndpointRegistry;
use crate::sync::config::{ClientConfig, MAX_ATTEMPTS, MAX_WAIT_MS};

/// Portfolio Sync CLI
#[derive(Parser, Debug)]
#[command(name = "portfolio-sync")]
#[command(about = "Sync brokerage portfolio data into CSV tables", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Brokerage environment (demo or live)
    #[arg(long, global = true, env = ENVIRONMENT_ENV, default_value = "demo")]
    pub env: Environment,

    /// API key
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Endpoint registry file overriding the built-in one
    #[arg(long, global = true)]
    pub endpoints: Option<PathBuf>,

    /// Disable the response cache
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Longest rate-limit or retry wait tolerated before failing, in seconds
    #[arg(long, global = true, default_value_t = MAX_WAIT_MS / 1000)]
    pub max_wait_secs: u64,

    /// Requests per logical call, including the first (range: 1-10)
    #[arg(long, global = true, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: u32,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync resources into CSV files
    Sync(SyncArgs),

    /// List configured endpoints
    Endpoints(EndpointsCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl Cli {
    /// Load the endpoint registry (file override or built-in)
    pub fn load_registry(&self) -> Result<EndpointRegistry, CliError> {
        let registry = match &self.endpoints {
            Some(path) => EndpointRegistry::from_file(path)?,
            None => EndpointRegistry::load_embedded()?,
        };
        Ok(registry)
    }

    /// Client settings from the global flags
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_max_wait(Duration::from_secs(self.max_wait_secs))
            .with_cache(!self.no_cache)
    }

    /// Build an API client for the configured environment
    pub fn build_client(&self, registry: Arc<EndpointRegistry>) -> Result<ApiClient, CliError> {
        let api_key = match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => {
                return Err(CliError::Api(
                    ConfigError::MissingCredential(format!(
                        "{API_KEY_ENV} is not set and --api-key was not given"
                    ))
                    .into(),
                ))
            }
        };

        let transport = ReqwestTransport::new()
            .map_err(|e| CliError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;
        let credentials = StaticCredentials::new(api_key, self.env);

        Ok(
            ApiClient::new(Arc::new(transport), Arc::new(credentials), registry)
                .with_config(self.client_config()),
        )
    }
}
