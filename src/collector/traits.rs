//! Core collector traits and types.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::collector::handoff::DeviceSnapshot;
use crate::metrics::{AppMetrics, MetricsError, MetricsRegistry, SeriesSpec};

/// Errors that can occur during collection.
///
/// None of these escape a scrape: the task runner logs them and flips the
/// liveness gauge, and sibling collectors keep running.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Transport error reaching the API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API rejected the credentials.
    #[error("authorization failed: status {0}")]
    Unauthorized(u16),

    /// Non-success status without a decodable error payload.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API answered with an authoritative error payload.
    #[error("API returned errors: {0}")]
    Api(String),

    /// The scrape deadline or the client cancelled the collection.
    #[error("cancelled before completion")]
    Cancelled,

    /// Writing to the metrics registry failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// The fixed set of collectors the exporter knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectorKind {
    Devices,
    Users,
    Tunnels,
    Dex,
    MagicWan,
}

impl CollectorKind {
    /// Every collector, in dispatch order.
    pub const ALL: [CollectorKind; 5] = [
        Self::Devices,
        Self::Users,
        Self::Tunnels,
        Self::Dex,
        Self::MagicWan,
    ];

    /// Stable name used in config, logs and CLI flags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Users => "users",
            Self::Tunnels => "tunnels",
            Self::Dex => "dex",
            Self::MagicWan => "magicwan",
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a collector receives for one scrape.
///
/// Cloning is cheap; clones share the cancellation token, the registry and the
/// per-scrape health flag.
#[derive(Clone)]
pub struct ScrapeContext {
    cancel: CancellationToken,
    registry: Arc<MetricsRegistry>,
    app: AppMetrics,
    healthy: Arc<AtomicBool>,
    debug: bool,
}

impl ScrapeContext {
    /// Create a context bound to `cancel`.
    pub fn new(
        cancel: CancellationToken,
        registry: Arc<MetricsRegistry>,
        app: AppMetrics,
        debug: bool,
    ) -> Self {
        Self {
            cancel,
            registry,
            app,
            healthy: Arc::new(AtomicBool::new(true)),
            debug,
        }
    }

    /// Token every network wait must observe.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the scrape deadline fires or the client goes away.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Shared metrics registry.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Set a gauge series in the shared registry.
    pub fn set_gauge(&self, series: &SeriesSpec, value: f64) -> Result<(), CollectorError> {
        self.registry.set_gauge(series, value)?;
        Ok(())
    }

    /// Record a collector failure for this scrape and the liveness gauge.
    pub fn mark_failed(&self) {
        self.healthy.store(false, Ordering::Release);
        self.app.mark_down();
    }

    /// Whether no collector has failed so far in this scrape.
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Whether per-collector diagnostics should be logged.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl std::fmt::Debug for ScrapeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeContext")
            .field("cancelled", &self.is_cancelled())
            .field("healthy", &self.healthy())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// A collector with no inputs besides the scrape context.
///
/// # Error Handling
///
/// `collect()` may write some series and then fail; whatever was written
/// stays in the registry. Returning `Err` marks the scrape unhealthy but never
/// affects sibling collectors.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Which collector this is.
    fn kind(&self) -> CollectorKind;

    /// Perform one collection, honoring `ctx`'s cancellation during all I/O.
    async fn collect(&self, ctx: &ScrapeContext) -> Result<(), CollectorError>;
}

/// The collector whose output feeds a dependent collector.
///
/// The task runner hands the returned snapshot to the consumer exactly once.
/// On `Err` it hands over an empty snapshot instead, so the consumer never waits.
#[async_trait::async_trait]
pub trait SnapshotProducer: Send + Sync + 'static {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Devices
    }

    /// Collect device metrics and return the per-device status mapping.
    async fn produce(&self, ctx: &ScrapeContext) -> Result<DeviceSnapshot, CollectorError>;
}

/// The collector that depends on the producer's snapshot.
///
/// Only invoked when a snapshot actually arrived; a closed handoff is logged
/// and skipped by the task runner.
#[async_trait::async_trait]
pub trait SnapshotConsumer: Send + Sync + 'static {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Users
    }

    /// Collect metrics using the owned device snapshot.
    async fn consume(
        &self,
        ctx: &ScrapeContext,
        snapshot: DeviceSnapshot,
    ) -> Result<(), CollectorError>;
}
