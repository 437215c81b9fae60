//! API credentials and environment selection

use std::fmt;
use std::str::FromStr;

use super::ConfigError;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "PORTFOLIO_API_KEY";

/// Environment variable selecting `demo` or `live`
pub const ENVIRONMENT_ENV: &str = "PORTFOLIO_ENV";

/// Brokerage environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Paper-trading account
    #[default]
    Demo,
    /// Real-money account
    Live,
}

impl Environment {
    /// Versioned base URL for the environment
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Demo => "https://demo.trading212.com/api/v0",
            Environment::Live => "https://live.trading212.com/api/v0",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Demo => write!(f, "demo"),
            Environment::Live => write!(f, "live"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demo" => Ok(Environment::Demo),
            "live" => Ok(Environment::Live),
            other => Err(format!("unknown environment '{other}', expected demo or live")),
        }
    }
}

/// Supplies the API credential and base URL
///
/// Called once per logical request, so a provider may pick up rotated keys.
pub trait CredentialProvider: Send + Sync {
    /// Opaque credential sent as the `Authorization` header
    fn credential(&self) -> Result<String, ConfigError>;

    /// Versioned base URL, e.g. `https://live.trading212.com/api/v0`
    fn base_url(&self) -> Result<String, ConfigError>;
}

/// Fixed credential and environment
#[derive(Clone)]
pub struct StaticCredentials {
    api_key: String,
    base_url: String,
}

impl StaticCredentials {
    /// Credential for one of the brokerage environments
    pub fn new(api_key: impl Into<String>, environment: Environment) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: environment.base_url().to_string(),
        }
    }

    /// Credential for an arbitrary base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self) -> Result<String, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("API key is empty".to_string()));
        }
        Ok(self.api_key.clone())
    }

    fn base_url(&self) -> Result<String, ConfigError> {
        Ok(self.base_url.clone())
    }
}

/// Reads `PORTFOLIO_API_KEY` and `PORTFOLIO_ENV` on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credential(&self) -> Result<String, ConfigError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(format!("{API_KEY_ENV} is not set"))),
        }
    }

    fn base_url(&self) -> Result<String, ConfigError> {
        let environment = parse_environment(std::env::var(ENVIRONMENT_ENV).ok())?;
        Ok(environment.base_url().to_string())
    }
}

/// Unset selects the default environment
fn parse_environment(value: Option<String>) -> Result<Environment, ConfigError> {
    match value {
        Some(value) => value
            .parse::<Environment>()
            .map_err(|e| ConfigError::InvalidEnvironment(format!("{ENVIRONMENT_ENV}: {e}"))),
        None => Ok(Environment::default()),
    }
}
