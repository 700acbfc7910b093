//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Cloudflare credentials and endpoints
//! - Scrape deadline and diagnostics
//! - Collector enablement

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, CloudflareConfig, ScrapeConfig, ServerConfig};
pub use collector::CollectorsConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_BASE_URL, DEFAULT_DEVICE_ONLINE_WINDOW, DEFAULT_GRAPHQL_URL, DEFAULT_PAGE_SIZE,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCRAPE_DEADLINE, MAX_PAGE_SIZE, MIN_SCRAPE_DEADLINE,
};
