//! Scrape Orchestrator
//!
//! Drives one scrape through `Idle → Dispatching → AwaitingCompletion →
//! Rendering → Done`: starts the deadline, dispatches every enabled collector,
//! waits for all of them and renders the registry.
//!
//! A collector failure never aborts the scrape. It marks the scrape unhealthy
//! and drops the liveness gauge to 0, and the exposition still renders with
//! whatever the other collectors wrote. When the request itself is cancelled
//! (client gone), rendering is skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::{
    CollectorSet, JoinBarrier, ScrapeContext, ScrapeDeadline, TaskReport, TaskStatus,
};
use crate::config::ScrapeConfig;
use crate::metrics::{AppMetrics, MetricsRegistry};

/// Orchestrator states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Dispatching,
    AwaitingCompletion,
    Rendering,
    Done,
}

impl ScrapeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::Rendering => "rendering",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized registry, or why there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exposition {
    /// Text exposition of the whole registry.
    Rendered(String),
    /// The request was cancelled before rendering.
    Skipped,
    /// Encoding the registry failed.
    Failed(String),
}

/// Result of one scrape.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// Time from request arrival to the end of the barrier wait.
    pub elapsed: Duration,
    /// Collector tasks started.
    pub attempted: usize,
    /// No collector of this scrape failed.
    pub healthy: bool,
    /// The scrape ceiling fired.
    pub deadline_expired: bool,
    /// The inbound request was cancelled.
    pub cancelled: bool,
    /// Process-wide API call counter after this scrape.
    pub api_calls: u64,
    /// Process-wide API error counter after this scrape.
    pub api_errors: u64,
    /// How each collector task ended.
    pub reports: Vec<TaskReport>,
    pub exposition: Exposition,
}

/// Runs scrapes against the shared registry.
///
/// One instance serves every request; overlapping scrapes share the registry
/// and the liveness gauge.
pub struct Scraper {
    registry: Arc<MetricsRegistry>,
    app: AppMetrics,
    collectors: CollectorSet,
    settings: ScrapeConfig,
}

impl Scraper {
    pub fn new(
        registry: Arc<MetricsRegistry>,
        app: AppMetrics,
        collectors: CollectorSet,
        settings: ScrapeConfig,
    ) -> Self {
        Self {
            registry,
            app,
            collectors,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.collectors
    }

    /// Run one scrape bound to the request's cancellation token.
    pub async fn scrape(&self, request: &CancellationToken) -> ScrapeOutcome {
        let started = Instant::now();
        let mut state = ScrapeState::Idle;

        transition(&mut state, ScrapeState::Dispatching);
        self.app.mark_up();
        let deadline = ScrapeDeadline::start(request, self.settings.deadline);
        let ctx = ScrapeContext::new(
            deadline.token(),
            Arc::clone(&self.registry),
            self.app.clone(),
            self.settings.debug,
        );

        let mut barrier = JoinBarrier::new();
        self.collectors.dispatch(&ctx, &mut barrier);
        let attempted = barrier.len();
        tracing::debug!(
            collectors = attempted,
            remaining = ?deadline.remaining(),
            "Collectors dispatched"
        );

        transition(&mut state, ScrapeState::AwaitingCompletion);
        let reports = barrier.wait().await;

        for report in &reports {
            if report.status != TaskStatus::Finished {
                ctx.mark_failed();
            }
        }

        let deadline_expired = deadline.expired();
        let cancelled = request.is_cancelled();
        drop(deadline);

        transition(&mut state, ScrapeState::Rendering);
        let elapsed = started.elapsed();
        self.app.observe_scrape(elapsed);

        let exposition = if cancelled {
            tracing::warn!(elapsed = ?elapsed, "Scrape request cancelled, skipping exposition");
            Exposition::Skipped
        } else {
            match self.registry.render() {
                Ok(text) => Exposition::Rendered(text),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to render metrics");
                    Exposition::Failed(e.to_string())
                }
            }
        };
        transition(&mut state, ScrapeState::Done);

        let outcome = ScrapeOutcome {
            elapsed,
            attempted,
            healthy: ctx.healthy(),
            deadline_expired,
            cancelled,
            api_calls: self.app.api_calls(),
            api_errors: self.app.api_errors(),
            reports,
            exposition,
        };

        if self.settings.debug {
            tracing::info!(
                elapsed = ?outcome.elapsed,
                collectors = outcome.attempted,
                healthy = outcome.healthy,
                deadline_expired = outcome.deadline_expired,
                api_calls = outcome.api_calls,
                api_errors = outcome.api_errors,
                "Scrape completed"
            );
        }

        outcome
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("collectors", &self.collectors)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn transition(state: &mut ScrapeState, next: ScrapeState) {
    tracing::debug!(from = %state, to = %next, "Scrape state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorKind;
    use crate::collector::testing::{Behavior, FakeCollector, FakeConsumer, FakeProducer};

    const CEILING: Duration = Duration::from_secs(25);

    fn scraper(collectors: CollectorSet) -> (Scraper, AppMetrics) {
        let registry = Arc::new(MetricsRegistry::new());
        let app = AppMetrics::register(&registry).unwrap();
        let settings = ScrapeConfig {
            deadline: CEILING,
            ..Default::default()
        };
        (
            Scraper::new(registry, app.clone(), collectors, settings),
            app,
        )
    }

    fn rendered(outcome: &ScrapeOutcome) -> &str {
        match &outcome.exposition {
            Exposition::Rendered(text) => text,
            other => panic!("expected a rendered exposition, got {other:?}"),
        }
    }

    fn has_series(scraper: &Scraper, kind: CollectorKind) -> bool {
        scraper
            .registry()
            .gauge_value(&FakeCollector::series(kind))
            .is_some()
    }

    /// Every collector is slow, so only the ceiling ends the scrape.
    fn slow_subset(mask: usize) -> CollectorSet {
        let slow = Duration::from_secs(60);
        let mut set = CollectorSet::new();
        for (bit, kind) in CollectorKind::ALL.into_iter().enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            set = match kind {
                CollectorKind::Devices => {
                    set.with_producer(FakeProducer::with_devices(&["d1"]).delayed(slow))
                }
                CollectorKind::Users => set.with_consumer(FakeConsumer::new()),
                other => set.with_collector(FakeCollector::new(other).delayed(slow)),
            };
        }
        set
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subset_finishes_within_ceiling() {
        for mask in 0..(1 << CollectorKind::ALL.len()) {
            let (scraper, _) = scraper(slow_subset(mask));
            let expected = scraper.collectors().len();

            let outcome = scraper.scrape(&CancellationToken::new()).await;

            assert!(outcome.elapsed <= CEILING, "subset {mask:05b} took {:?}", outcome.elapsed);
            assert_eq!(outcome.attempted, expected);
            assert_eq!(outcome.reports.len(), expected);
            assert!(matches!(outcome.exposition, Exposition::Rendered(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_renders_partial_exposition() {
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_collector(FakeCollector::new(CollectorKind::Tunnels))
                .with_collector(
                    FakeCollector::new(CollectorKind::Dex).delayed(Duration::from_secs(60)),
                ),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert_eq!(outcome.elapsed, CEILING);
        assert!(outcome.deadline_expired);
        assert!(!outcome.cancelled);
        assert!(!outcome.healthy);
        assert!(!app.is_up());
        assert!(has_series(&scraper, CollectorKind::Tunnels));
        assert!(!has_series(&scraper, CollectorKind::Dex));
        assert!(rendered(&outcome).contains("zerotrust_exporter_up 0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_collectors_renders_immediately() {
        let (scraper, app) = scraper(CollectorSet::new());
        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert!(outcome.healthy);
        assert!(app.is_up());
        assert_eq!(app.scrape_count(), 1);
        assert!(rendered(&outcome).contains("zerotrust_exporter_scrape_duration_seconds_count 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_without_devices_does_not_block() {
        let consumer = FakeConsumer::new();
        let received = consumer.received();
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_consumer(consumer)
                .with_collector(FakeCollector::new(CollectorKind::Tunnels)),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert!(!outcome.deadline_expired);
        assert!(outcome.healthy);
        assert!(app.is_up());
        assert!(received.lock().is_empty());
        assert!(!has_series(&scraper, CollectorKind::Users));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_devices_still_releases_users() {
        let consumer = FakeConsumer::new();
        let received = consumer.received();
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_producer(
                    FakeProducer::with_devices(&["d1"])
                        .delayed(Duration::from_secs(2))
                        .behave(Behavior::Fail),
                )
                .with_consumer(consumer),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert_eq!(outcome.elapsed, Duration::from_secs(2));
        assert!(!outcome.healthy);
        assert!(!app.is_up());
        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert!(received[0].is_empty());
        assert!(rendered(&outcome).contains("zerotrust_exporter_up 0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_devices_and_users_only() {
        let consumer = FakeConsumer::new();
        let received = consumer.received();
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_producer(FakeProducer::with_devices(&["d1", "d2"]))
                .with_consumer(consumer),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert!(outcome.healthy);
        assert!(app.is_up());
        assert_eq!(received.lock().len(), 1);
        assert_eq!(received.lock()[0].len(), 2);
        assert!(has_series(&scraper, CollectorKind::Devices));
        assert!(has_series(&scraper, CollectorKind::Users));
        for kind in [CollectorKind::Tunnels, CollectorKind::Dex, CollectorKind::MagicWan] {
            assert!(!has_series(&scraper, kind));
        }
        assert!(rendered(&outcome).contains("zerotrust_exporter_up 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_collector_isolated_from_siblings() {
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_producer(FakeProducer::with_devices(&["d1"]))
                .with_consumer(FakeConsumer::new())
                .with_collector(FakeCollector::new(CollectorKind::Tunnels))
                .with_collector(FakeCollector::new(CollectorKind::Dex))
                .with_collector(FakeCollector::new(CollectorKind::MagicWan).behave(Behavior::Fail)),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert!(!outcome.healthy);
        assert!(!app.is_up());
        assert!(!has_series(&scraper, CollectorKind::MagicWan));
        for kind in [
            CollectorKind::Devices,
            CollectorKind::Users,
            CollectorKind::Tunnels,
            CollectorKind::Dex,
        ] {
            assert!(has_series(&scraper, kind), "{kind} series missing");
        }
        assert!(matches!(outcome.exposition, Exposition::Rendered(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_collector_counts_as_failure() {
        let (scraper, app) = scraper(
            CollectorSet::new()
                .with_collector(FakeCollector::new(CollectorKind::Tunnels).behave(Behavior::Panic))
                .with_collector(FakeCollector::new(CollectorKind::Dex)),
        );

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert!(!outcome.healthy);
        assert!(!app.is_up());
        assert!(
            outcome
                .reports
                .iter()
                .any(|r| r.kind == CollectorKind::Tunnels && r.status == TaskStatus::Panicked)
        );
        assert!(has_series(&scraper, CollectorKind::Dex));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_cancellation_skips_exposition() {
        let consumer = FakeConsumer::new();
        let received = consumer.received();
        let (scraper, _) = scraper(
            CollectorSet::new()
                .with_producer(
                    FakeProducer::with_devices(&["d1"]).delayed(Duration::from_secs(10)),
                )
                .with_consumer(consumer)
                .with_collector(
                    FakeCollector::new(CollectorKind::Tunnels).delayed(Duration::from_secs(10)),
                ),
        );

        let request = CancellationToken::new();
        let trigger = request.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let outcome = scraper.scrape(&request).await;

        assert_eq!(outcome.elapsed, Duration::from_secs(2));
        assert!(outcome.cancelled);
        assert!(!outcome.deadline_expired);
        assert_eq!(outcome.exposition, Exposition::Skipped);
        assert!(outcome.reports.iter().all(|r| r.status == TaskStatus::Finished));
        assert!(!has_series(&scraper, CollectorKind::Tunnels));
        assert!(received.lock().iter().all(|s| s.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_waits_for_uncooperative_collector() {
        let (scraper, _) = scraper(CollectorSet::new().with_collector(
            FakeCollector::new(CollectorKind::Dex)
                .delayed(Duration::from_secs(40))
                .ignoring_cancel(),
        ));

        let outcome = scraper.scrape(&CancellationToken::new()).await;

        assert_eq!(outcome.elapsed, Duration::from_secs(40));
        assert!(outcome.deadline_expired);
        assert!(has_series(&scraper, CollectorKind::Dex));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_scrapes_keep_single_series() {
        let (scraper, _) = scraper(
            CollectorSet::new()
                .with_producer(
                    FakeProducer::with_devices(&["d1"]).delayed(Duration::from_secs(1)),
                )
                .with_consumer(FakeConsumer::new())
                .with_collector(
                    FakeCollector::new(CollectorKind::Tunnels).delayed(Duration::from_secs(3)),
                )
                .with_collector(FakeCollector::new(CollectorKind::Dex)),
        );
        let scraper = Arc::new(scraper);

        let first_request = CancellationToken::new();
        let second_request = CancellationToken::new();
        let (first, second) = tokio::join!(scraper.scrape(&first_request), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            scraper.scrape(&second_request).await
        });

        assert!(first.healthy && second.healthy);
        let text = rendered(&second);
        for kind in [
            CollectorKind::Devices,
            CollectorKind::Users,
            CollectorKind::Tunnels,
            CollectorKind::Dex,
        ] {
            let line = format!("fake_collector_up{{collector=\"{kind}\"}} 1");
            assert_eq!(text.matches(&line).count(), 1, "{line}");
        }
        assert_eq!(text.matches("# TYPE fake_collector_up gauge").count(), 1);
        assert!(text.contains("zerotrust_exporter_scrape_duration_seconds_count 2"));
    }

    #[test]
    fn test_state_names() {
        let names: Vec<_> = [
            ScrapeState::Idle,
            ScrapeState::Dispatching,
            ScrapeState::AwaitingCompletion,
            ScrapeState::Rendering,
            ScrapeState::Done,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["idle", "dispatching", "awaiting_completion", "rendering", "done"]);
    }
}
