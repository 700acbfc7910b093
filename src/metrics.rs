//! Metrics Layer
//!
//! Process-wide Prometheus registry shared by every scrape and every collector.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: Thread-safe registry with get-or-create gauge families
//! - [`SeriesSpec`]: Identity of one gauge series (name + label set)
//! - [`AppMetrics`]: Exporter self-diagnostics (liveness, API calls/errors, scrape duration)
//!
//! # Example
//!
//! ```rust
//! use zerotrust_exporter::metrics::{AppMetrics, MetricsRegistry, SeriesSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MetricsRegistry::new();
//! let app = AppMetrics::register(&registry)?;
//! app.mark_up();
//!
//! let series = SeriesSpec::new("zerotrust_tunnels_up", "Tunnel health").label("name", "edge-1");
//! registry.set_gauge(&series, 1.0)?;
//!
//! assert!(registry.render()?.contains("zerotrust_tunnels_up{name=\"edge-1\"} 1"));
//! # Ok(())
//! # }
//! ```

mod app;
mod registry;

pub use app::AppMetrics;
pub use registry::{MetricsError, MetricsRegistry, SeriesSpec, TEXT_CONTENT_TYPE};
