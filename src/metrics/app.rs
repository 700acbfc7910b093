//! Exporter self-diagnostics.

use std::time::Duration;

use prometheus::{Gauge, Histogram, IntCounter};

use super::registry::{MetricsError, MetricsRegistry};

const UP: &str = "zerotrust_exporter_up";
const API_CALLS: &str = "zerotrust_exporter_api_calls_total";
const API_ERRORS: &str = "zerotrust_exporter_api_errors_total";
const SCRAPE_DURATION: &str = "zerotrust_exporter_scrape_duration_seconds";

/// Scrape duration buckets in seconds, up to just past the default deadline.
const SCRAPE_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0];

/// Liveness gauge, API counters and scrape-duration histogram.
///
/// Cloning is cheap; all clones address the same underlying series.
#[derive(Clone)]
pub struct AppMetrics {
    up: Gauge,
    api_calls: IntCounter,
    api_errors: IntCounter,
    scrape_duration: Histogram,
}

impl AppMetrics {
    /// Register the diagnostic metrics in `registry`.
    ///
    /// # Errors
    /// Fails if the metrics were already registered in this registry.
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            up: registry.register_gauge(
                UP,
                "Whether the last scrape completed without collector failures (1 = healthy)",
            )?,
            api_calls: registry.register_counter(API_CALLS, "Total Cloudflare API calls made")?,
            api_errors: registry
                .register_counter(API_ERRORS, "Total Cloudflare API calls that failed")?,
            scrape_duration: registry.register_histogram(
                SCRAPE_DURATION,
                "Duration of /metrics scrapes in seconds",
                SCRAPE_BUCKETS.to_vec(),
            )?,
        })
    }

    /// Optimistically mark the exporter healthy at scrape start.
    pub fn mark_up(&self) {
        self.up.set(1.0);
    }

    /// Mark the exporter unhealthy after a collector failure.
    pub fn mark_down(&self) {
        self.up.set(0.0);
    }

    /// Whether the liveness gauge currently reads healthy.
    pub fn is_up(&self) -> bool {
        self.up.get() >= 1.0
    }

    pub fn inc_api_calls(&self) {
        self.api_calls.inc();
    }

    pub fn inc_api_errors(&self) {
        self.api_errors.inc();
    }

    pub fn api_calls(&self) -> u64 {
        self.api_calls.get()
    }

    pub fn api_errors(&self) -> u64 {
        self.api_errors.get()
    }

    /// Record one scrape's elapsed time.
    pub fn observe_scrape(&self, elapsed: Duration) {
        self.scrape_duration.observe(elapsed.as_secs_f64());
    }

    /// Number of scrapes recorded in the duration histogram.
    pub fn scrape_count(&self) -> u64 {
        self.scrape_duration.get_sample_count()
    }
}

impl std::fmt::Debug for AppMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppMetrics")
            .field("up", &self.up.get())
            .field("api_calls", &self.api_calls.get())
            .field("api_errors", &self.api_errors.get())
            .field("scrapes", &self.scrape_count())
            .finish()
    }
}
