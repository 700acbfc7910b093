//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collector::CollectorsConfig;
use super::validation::{ConfigError, expand_env_vars, require_non_empty, validate_http_url};

// =============================================================================
// Constants
// =============================================================================

/// Default scrape deadline (25 seconds).
pub const DEFAULT_SCRAPE_DEADLINE: Duration = Duration::from_secs(25);

/// Minimum allowed scrape deadline (1 second).
pub const MIN_SCRAPE_DEADLINE: Duration = Duration::from_secs(1);

/// Default per-request API timeout (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window in which a device's last check-in counts as online.
pub const DEFAULT_DEVICE_ONLINE_WINDOW: Duration = Duration::from_secs(300);

/// Default Cloudflare v4 API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default Cloudflare GraphQL analytics endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.cloudflare.com/client/v4/graphql";

/// Default page size for paginated list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page size the list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 1000;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_graphql_url() -> String {
    DEFAULT_GRAPHQL_URL.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_deadline() -> Duration {
    DEFAULT_SCRAPE_DEADLINE
}

fn default_online_window() -> Duration {
    DEFAULT_DEVICE_ONLINE_WINDOW
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9184).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9184,
        }
    }
}

// =============================================================================
// Cloudflare API Configuration
// =============================================================================

/// Cloudflare API credentials and endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API token sent as a bearer credential.
    #[serde(default)]
    pub api_token: String,

    /// Account identifier all collectors query.
    #[serde(default)]
    pub account_id: String,

    /// v4 REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// GraphQL analytics endpoint.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// Per-request timeout (default: 10s). Independent of the scrape deadline.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Page size for list endpoints (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            account_id: String::new(),
            base_url: default_base_url(),
            graphql_url: default_graphql_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("graphql_url", &self.graphql_url)
            .field("request_timeout", &self.request_timeout)
            .field("page_size", &self.page_size)
            .finish()
    }
}

// =============================================================================
// Scrape Configuration
// =============================================================================

/// Per-scrape behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Ceiling for a whole scrape, measured from request arrival (default: 25s).
    #[serde(default = "default_deadline", with = "humantime_serde")]
    pub deadline: Duration,

    /// Log per-scrape diagnostics (duration, API calls, API errors).
    #[serde(default)]
    pub debug: bool,

    /// A device whose last check-in is within this window is online (default: 5m).
    #[serde(default = "default_online_window", with = "humantime_serde")]
    pub device_online_window: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_SCRAPE_DEADLINE,
            debug: false,
            device_online_window: DEFAULT_DEVICE_ONLINE_WINDOW,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cloudflare API configuration.
    #[serde(default)]
    pub cloudflare: CloudflareConfig,

    /// Scrape behaviour.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Collector enablement.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl AppConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file without validating it.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded first, so
    /// credentials can stay in the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML text after environment expansion.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::Validation(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server port must be non-zero".to_string(),
            ));
        }

        require_non_empty("cloudflare.api_token", &self.cloudflare.api_token)?;
        require_non_empty("cloudflare.account_id", &self.cloudflare.account_id)?;
        validate_http_url("cloudflare.base_url", &self.cloudflare.base_url)?;
        validate_http_url("cloudflare.graphql_url", &self.cloudflare.graphql_url)?;

        if !(1..=MAX_PAGE_SIZE).contains(&self.cloudflare.page_size) {
            return Err(ConfigError::Validation(format!(
                "cloudflare.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        if self.scrape.deadline < MIN_SCRAPE_DEADLINE {
            return Err(ConfigError::Validation(format!(
                "scrape.deadline must be at least {:?}",
                MIN_SCRAPE_DEADLINE
            )));
        }

        if self.cloudflare.request_timeout > self.scrape.deadline {
            tracing::warn!(
                request_timeout = ?self.cloudflare.request_timeout,
                deadline = ?self.scrape.deadline,
                "API request timeout exceeds scrape deadline; the deadline will cut requests short"
            );
        }

        self.collectors.validate()?;

        Ok(())
    }
}
