//! zerotrust-exporter Binary Entry Point
//!
//! Serves Cloudflare Zero Trust metrics for Prometheus.
//! Core functionality is provided by the `zerotrust_exporter` library crate.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zerotrust_exporter::{
    cloudflare::ApiClient,
    collector::{CollectorKind, CollectorSet},
    config::{AppConfig, parse_duration},
    metrics::{AppMetrics, MetricsRegistry},
    scrape::Scraper,
    server::{AppState, create_router},
};

/// Prometheus exporter for Cloudflare Zero Trust
#[derive(Parser, Debug)]
#[command(name = "zerotrust-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional; defaults and environment are used without it)
    #[arg(short, long, env = "ZEROTRUST_EXPORTER_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "ZEROTRUST_EXPORTER_BIND")]
    bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "ZEROTRUST_EXPORTER_PORT")]
    port: Option<u16>,

    /// Cloudflare API token (overrides config file)
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Cloudflare account ID (overrides config file)
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Scrape deadline, e.g. `25s` (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    deadline: Option<Duration>,

    /// Log per-scrape and per-collector diagnostics
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    enable_devices: bool,
    #[arg(long, conflicts_with = "enable_devices")]
    disable_devices: bool,

    #[arg(long)]
    enable_users: bool,
    #[arg(long, conflicts_with = "enable_users")]
    disable_users: bool,

    #[arg(long)]
    enable_tunnels: bool,
    #[arg(long, conflicts_with = "enable_tunnels")]
    disable_tunnels: bool,

    #[arg(long)]
    enable_dex: bool,
    #[arg(long, conflicts_with = "enable_dex")]
    disable_dex: bool,

    #[arg(long)]
    enable_magicwan: bool,
    #[arg(long, conflicts_with = "enable_magicwan")]
    disable_magicwan: bool,
}

impl Cli {
    /// Per-collector `(enable, disable)` flags.
    fn collector_flags(&self) -> [(CollectorKind, bool, bool); 5] {
        [
            (CollectorKind::Devices, self.enable_devices, self.disable_devices),
            (CollectorKind::Users, self.enable_users, self.disable_users),
            (CollectorKind::Tunnels, self.enable_tunnels, self.disable_tunnels),
            (CollectorKind::Dex, self.enable_dex, self.disable_dex),
            (CollectorKind::MagicWan, self.enable_magicwan, self.disable_magicwan),
        ]
    }

    /// Apply CLI/env overrides (CLI > ENV > config file).
    fn apply(self, config: &mut AppConfig) {
        for (kind, enable, disable) in self.collector_flags() {
            if enable {
                config.collectors.set(kind, true);
            } else if disable {
                config.collectors.set(kind, false);
            }
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(token) = self.api_token {
            config.cloudflare.api_token = token;
        }
        if let Some(account_id) = self.account_id {
            config.cloudflare.account_id = account_id;
        }
        if let Some(deadline) = self.deadline {
            config.scrape.deadline = deadline;
        }
        if self.debug {
            config.scrape.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zerotrust_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("zerotrust-exporter {}", env!("CARGO_PKG_VERSION"));

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration, then overrides, then validate the merged result
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::from_file(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults and environment");
            AppConfig::default()
        }
    };
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, account: {}, deadline: {:?}",
        config.server.bind,
        config.server.port,
        config.cloudflare.account_id,
        config.scrape.deadline,
    );

    // Build metrics and collectors
    let registry = Arc::new(MetricsRegistry::new());
    let app_metrics = AppMetrics::register(&registry)?;
    let client = ApiClient::new(&config.cloudflare, app_metrics.clone())?;
    let collectors = CollectorSet::from_config(&config, &client);

    let enabled: Vec<String> = collectors.kinds().iter().map(ToString::to_string).collect();
    tracing::info!(collectors = ?enabled, "Collectors enabled");

    let scraper = Scraper::new(registry, app_metrics, collectors, config.scrape.clone());
    let app = create_router(AppState {
        scraper: Arc::new(scraper),
    });

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Metrics available at: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
