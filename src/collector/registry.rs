//! Enabled collector set and the per-scrape task runners.

use std::sync::Arc;

use tokio::time::Instant;

use crate::cloudflare::ApiClient;
use crate::collector::barrier::JoinBarrier;
use crate::collector::handoff::{self, DeviceSnapshot, Handoff, HandoffReceiver, HandoffSender};
use crate::collector::{
    Collector, CollectorError, CollectorKind, DeviceCollector, DexCollector, MagicWanCollector,
    ScrapeContext, SnapshotConsumer, SnapshotProducer, TunnelCollector, UserCollector,
};
use crate::config::AppConfig;

/// The collectors enabled for the process lifetime.
///
/// Built once at startup; every scrape dispatches the same set.
#[derive(Default)]
pub struct CollectorSet {
    producer: Option<Arc<dyn SnapshotProducer>>,
    consumer: Option<Arc<dyn SnapshotConsumer>>,
    independent: Vec<Arc<dyn Collector>>,
}

impl CollectorSet {
    /// An empty set. Scrapes over it only render the diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set from the enablement flags.
    pub fn from_config(config: &AppConfig, client: &ApiClient) -> Self {
        let enabled = &config.collectors;
        let mut set = Self::new();

        if enabled.is_enabled(CollectorKind::Devices) {
            set = set.with_producer(DeviceCollector::new(
                client.clone(),
                config.scrape.device_online_window,
            ));
        }
        if enabled.is_enabled(CollectorKind::Users) {
            set = set.with_consumer(UserCollector::new(client.clone()));
        }
        if enabled.is_enabled(CollectorKind::Tunnels) {
            set = set.with_collector(TunnelCollector::new(client.clone()));
        }
        if enabled.is_enabled(CollectorKind::Dex) {
            set = set.with_collector(DexCollector::new(client.clone()));
        }
        if enabled.is_enabled(CollectorKind::MagicWan) {
            set = set.with_collector(MagicWanCollector::new(client.clone()));
        }

        set
    }

    /// Set the snapshot producer.
    pub fn with_producer(mut self, producer: impl SnapshotProducer) -> Self {
        self.producer = Some(Arc::new(producer));
        self
    }

    /// Set the snapshot consumer.
    pub fn with_consumer(mut self, consumer: impl SnapshotConsumer) -> Self {
        self.consumer = Some(Arc::new(consumer));
        self
    }

    /// Add an independent collector.
    pub fn with_collector(mut self, collector: impl Collector) -> Self {
        self.independent.push(Arc::new(collector));
        self
    }

    /// Kinds of the enabled collectors, producer and consumer first.
    pub fn kinds(&self) -> Vec<CollectorKind> {
        self.producer
            .iter()
            .map(|p| p.kind())
            .chain(self.consumer.iter().map(|c| c.kind()))
            .chain(self.independent.iter().map(|c| c.kind()))
            .collect()
    }

    pub fn len(&self) -> usize {
        usize::from(self.producer.is_some())
            + usize::from(self.consumer.is_some())
            + self.independent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start one task per enabled collector on `barrier`.
    ///
    /// The handoff is wired here: with no producer the sender is closed before
    /// the consumer starts, so the consumer sees "no data" without waiting.
    pub fn dispatch(&self, ctx: &ScrapeContext, barrier: &mut JoinBarrier) {
        let (tx, rx) = handoff::channel();

        match &self.producer {
            Some(producer) => barrier.spawn(
                producer.kind(),
                run_producer(Arc::clone(producer), ctx.clone(), tx),
            ),
            None => {
                tracing::debug!("Device collector disabled, closing snapshot handoff");
                tx.close();
            }
        }

        if let Some(consumer) = &self.consumer {
            barrier.spawn(
                consumer.kind(),
                run_consumer(Arc::clone(consumer), ctx.clone(), rx),
            );
        }

        for collector in &self.independent {
            barrier.spawn(
                collector.kind(),
                run_independent(Arc::clone(collector), ctx.clone()),
            );
        }
    }
}

impl std::fmt::Debug for CollectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}

// =============================================================================
// Task runners
// =============================================================================

/// Log a collector failure and flag it on the scrape.
fn record_failure(ctx: &ScrapeContext, name: CollectorKind, error: &CollectorError) {
    match error {
        CollectorError::Cancelled => {
            tracing::warn!(collector = %name, "Collection cancelled by scrape deadline")
        }
        e => tracing::error!(collector = %name, error = %e, "Collection failed"),
    }
    ctx.mark_failed();
}

/// Run an independent collector to completion.
async fn run_independent(collector: Arc<dyn Collector>, ctx: ScrapeContext) {
    let name = collector.kind();
    let start = Instant::now();
    tracing::debug!(collector = %name, "Running collection");

    match collector.collect(&ctx).await {
        Ok(()) => {
            let duration_ms = start.elapsed().as_millis();
            tracing::debug!(collector = %name, duration_ms, "Collection succeeded");
        }
        Err(e) => record_failure(&ctx, name, &e),
    }
}

/// Run the producer and hand exactly one snapshot over, empty on failure.
///
/// A panic drops `tx` during unwinding, which closes the handoff.
async fn run_producer(producer: Arc<dyn SnapshotProducer>, ctx: ScrapeContext, tx: HandoffSender) {
    let name = producer.kind();
    let start = Instant::now();
    tracing::debug!(collector = %name, "Running collection");

    let snapshot = match producer.produce(&ctx).await {
        Ok(snapshot) => {
            let duration_ms = start.elapsed().as_millis();
            tracing::debug!(
                collector = %name,
                duration_ms,
                devices = snapshot.len(),
                "Collection succeeded"
            );
            snapshot
        }
        Err(e) => {
            record_failure(&ctx, name, &e);
            DeviceSnapshot::new()
        }
    };

    if !tx.send(snapshot) {
        tracing::trace!(collector = %name, "No consumer for device snapshot");
    }
}

/// Receive the snapshot once, then run the consumer if one arrived.
async fn run_consumer(
    consumer: Arc<dyn SnapshotConsumer>,
    ctx: ScrapeContext,
    rx: HandoffReceiver,
) {
    let name = consumer.kind();
    tracing::debug!(collector = %name, "Waiting for device snapshot");

    let snapshot = match rx.recv(ctx.cancel_token()).await {
        Handoff::Delivered(snapshot) => snapshot,
        Handoff::Closed => {
            tracing::warn!(
                collector = %name,
                "No device snapshot available, skipping collection"
            );
            return;
        }
        Handoff::Cancelled => {
            tracing::warn!(
                collector = %name,
                "Scrape cancelled before device snapshot arrived, skipping collection"
            );
            return;
        }
    };

    let start = Instant::now();
    match consumer.consume(&ctx, snapshot).await {
        Ok(()) => {
            let duration_ms = start.elapsed().as_millis();
            tracing::debug!(collector = %name, duration_ms, "Collection succeeded");
        }
        Err(e) => record_failure(&ctx, name, &e),
    }
}
