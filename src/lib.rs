//! zerotrust-exporter - Prometheus exporter for Cloudflare Zero Trust
//!
//! This crate provides the scrape orchestrator and the Cloudflare collectors
//! behind the `zerotrust-exporter` binary. It can also be embedded: build a
//! [`CollectorSet`], hand it to a [`Scraper`] and serve [`server::create_router`].
//!
//! # Architecture
//!
//! - **Config**: YAML file + environment expansion + CLI overrides
//! - **Metrics**: process-wide Prometheus registry and exporter diagnostics
//! - **Cloudflare**: v4 REST and GraphQL client
//! - **Collectors**: devices, users, tunnels, DEX and Magic WAN, run concurrently per scrape
//! - **Scrape**: deadline, device → user handoff, join barrier, rendering
//! - **Server**: `/metrics` and `/healthz`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zerotrust_exporter::{ApiClient, AppConfig, AppMetrics, CollectorSet, MetricsRegistry, Scraper};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("config.yaml")?;
//! let registry = Arc::new(MetricsRegistry::new());
//! let app = AppMetrics::register(&registry)?;
//! let client = ApiClient::new(&config.cloudflare, app.clone())?;
//!
//! let collectors = CollectorSet::from_config(&config, &client);
//! let scraper = Scraper::new(registry, app, collectors, config.scrape.clone());
//! let outcome = scraper.scrape(&CancellationToken::new()).await;
//! println!("healthy: {}", outcome.healthy);
//! # Ok(())
//! # }
//! ```

pub mod cloudflare;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod scrape;
pub mod server;

pub use cloudflare::ApiClient;
pub use collector::{Collector, CollectorError, CollectorKind, CollectorSet, ScrapeContext};
pub use config::{AppConfig, ConfigError};
pub use metrics::{AppMetrics, MetricsError, MetricsRegistry};
pub use scrape::{Exposition, ScrapeOutcome, Scraper};
