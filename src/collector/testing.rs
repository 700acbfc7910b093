//! Shared fixtures for collector tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use crate::cloudflare::ApiClient;
use crate::collector::handoff::{DeviceSnapshot, DeviceStatus};
use crate::collector::{
    Collector, CollectorError, CollectorKind, ScrapeContext, SnapshotConsumer, SnapshotProducer,
};
use crate::config::CloudflareConfig;
use crate::metrics::{AppMetrics, MetricsRegistry, SeriesSpec};

/// A registry, an API client pointed at `server` and a scrape context.
pub(crate) struct TestContext {
    pub registry: Arc<MetricsRegistry>,
    pub app: AppMetrics,
    pub client: ApiClient,
    pub ctx: ScrapeContext,
}

impl TestContext {
    pub fn new(server: &MockServer) -> Self {
        let registry = Arc::new(MetricsRegistry::new());
        let app = AppMetrics::register(&registry).unwrap();
        app.mark_up();

        let config = CloudflareConfig {
            api_token: "test-token".to_string(),
            account_id: "acc".to_string(),
            base_url: server.uri(),
            graphql_url: format!("{}/graphql", server.uri()),
            ..Default::default()
        };
        let client = ApiClient::new(&config, app.clone()).unwrap();
        let ctx = ScrapeContext::new(
            CancellationToken::new(),
            Arc::clone(&registry),
            app.clone(),
            true,
        );

        Self {
            registry,
            app,
            client,
            ctx,
        }
    }
}

/// Wrap `result` in a successful single-page v4 envelope.
pub(crate) fn envelope(result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
        "result_info": { "page": 1, "per_page": 100, "total_pages": 1 }
    })
}

// =============================================================================
// Fake collectors
// =============================================================================

/// A context over a fresh registry with liveness already up.
pub(crate) fn fake_context() -> (ScrapeContext, AppMetrics) {
    let registry = Arc::new(MetricsRegistry::new());
    let app = AppMetrics::register(&registry).unwrap();
    app.mark_up();
    let ctx = ScrapeContext::new(CancellationToken::new(), registry, app.clone(), false);
    (ctx, app)
}

/// How a fake behaves once its delay has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Sleep for `delay` unless the scrape is cancelled first.
async fn wait(ctx: &ScrapeContext, delay: Duration) -> Result<(), CollectorError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(CollectorError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fail or panic before anything is written, like an error payload would.
fn check(kind: CollectorKind, behavior: Behavior) -> Result<(), CollectorError> {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail => Err(CollectorError::Api(format!("{kind} upstream rejected the query"))),
        Behavior::Panic => panic!("{kind} collector panicked"),
    }
}

/// Independent collector writing `fake_collector_up{collector=kind}`.
pub(crate) struct FakeCollector {
    kind: CollectorKind,
    delay: Duration,
    behavior: Behavior,
    ignore_cancel: bool,
}

impl FakeCollector {
    pub fn new(kind: CollectorKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            behavior: Behavior::Succeed,
            ignore_cancel: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Keep sleeping through cancellation, like a collector stuck in I/O.
    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    pub fn series(kind: CollectorKind) -> SeriesSpec {
        SeriesSpec::new("fake_collector_up", "Fake collector output")
            .label("collector", kind.as_str())
    }
}

#[async_trait::async_trait]
impl Collector for FakeCollector {
    fn kind(&self) -> CollectorKind {
        self.kind
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<(), CollectorError> {
        if self.ignore_cancel {
            tokio::time::sleep(self.delay).await;
        } else {
            wait(ctx, self.delay).await?;
        }
        check(self.kind, self.behavior)?;
        ctx.set_gauge(&Self::series(self.kind), 1.0)?;
        Ok(())
    }
}

/// Producer returning a fixed set of online devices.
pub(crate) struct FakeProducer {
    snapshot: DeviceSnapshot,
    delay: Duration,
    behavior: Behavior,
}

impl FakeProducer {
    pub fn with_devices(ids: &[&str]) -> Self {
        let snapshot = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    DeviceStatus {
                        name: format!("{id}-name"),
                        user_email: Some(format!("{id}@example.com")),
                        online: true,
                        last_seen: None,
                    },
                )
            })
            .collect();
        Self {
            snapshot,
            delay: Duration::ZERO,
            behavior: Behavior::Succeed,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[async_trait::async_trait]
impl SnapshotProducer for FakeProducer {
    async fn produce(&self, ctx: &ScrapeContext) -> Result<DeviceSnapshot, CollectorError> {
        wait(ctx, self.delay).await?;
        check(CollectorKind::Devices, self.behavior)?;
        ctx.set_gauge(&FakeCollector::series(CollectorKind::Devices), 1.0)?;
        Ok(self.snapshot.clone())
    }
}

/// Consumer recording every snapshot it is given.
pub(crate) struct FakeConsumer {
    received: Arc<Mutex<Vec<DeviceSnapshot>>>,
}

impl FakeConsumer {
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn received(&self) -> Arc<Mutex<Vec<DeviceSnapshot>>> {
        Arc::clone(&self.received)
    }
}

#[async_trait::async_trait]
impl SnapshotConsumer for FakeConsumer {
    async fn consume(
        &self,
        ctx: &ScrapeContext,
        snapshot: DeviceSnapshot,
    ) -> Result<(), CollectorError> {
        self.received.lock().push(snapshot);
        ctx.set_gauge(&FakeCollector::series(CollectorKind::Users), 1.0)?;
        Ok(())
    }
}
