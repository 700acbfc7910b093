//! Collector Layer
//!
//! Collectors query one Cloudflare data source each and write gauges into the
//! shared registry. Every scrape runs each enabled collector as its own Tokio
//! task under one cancellation scope.
//!
//! # Architecture
//!
//! - [`Collector`], [`SnapshotProducer`], [`SnapshotConsumer`]: collector contracts
//! - [`handoff`]: one-shot device snapshot channel from devices to users
//! - [`ScrapeDeadline`]: request-derived cancellation scope with a ceiling
//! - [`JoinBarrier`]: waits for every collector task, containing panics
//! - [`CollectorSet`]: the enabled collectors and their task runners
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zerotrust_exporter::collector::{CollectorSet, JoinBarrier, ScrapeContext, ScrapeDeadline};
//! use zerotrust_exporter::metrics::{AppMetrics, MetricsRegistry};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(set: CollectorSet) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(MetricsRegistry::new());
//! let app = AppMetrics::register(&registry)?;
//!
//! let deadline = ScrapeDeadline::start(&CancellationToken::new(), Duration::from_secs(25));
//! let ctx = ScrapeContext::new(deadline.token(), registry, app, false);
//! let mut barrier = JoinBarrier::new();
//! set.dispatch(&ctx, &mut barrier);
//! let reports = barrier.wait().await;
//! # Ok(())
//! # }
//! ```

mod barrier;
mod deadline;
mod devices;
mod dex;
pub mod handoff;
mod magicwan;
mod registry;
mod traits;
mod tunnels;
mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use barrier::{JoinBarrier, TaskReport, TaskStatus};
pub use deadline::ScrapeDeadline;
pub use devices::DeviceCollector;
pub use dex::DexCollector;
pub use handoff::{DeviceSnapshot, DeviceStatus};
pub use magicwan::MagicWanCollector;
pub use registry::CollectorSet;
pub use traits::{
    Collector, CollectorError, CollectorKind, ScrapeContext, SnapshotConsumer, SnapshotProducer,
};
pub use tunnels::TunnelCollector;
pub use users::UserCollector;
