//! Digital Experience Monitoring (DEX) test collector.

use serde::Deserialize;
use tokio::time::Instant;

use crate::cloudflare::ApiClient;
use crate::collector::{Collector, CollectorError, CollectorKind, ScrapeContext};
use crate::metrics::SeriesSpec;

const DEX_TEST_ENABLED: &str = "zerotrust_dex_test_enabled";
const DEX_TEST_ENABLED_HELP: &str = "Whether the DEX test is enabled (1) or not (0)";

#[derive(Debug, Deserialize)]
struct DexTest {
    test_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    data: DexTestData,
}

#[derive(Debug, Default, Deserialize)]
struct DexTestData {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    host: String,
}

/// Exports the configured DEX tests and whether each is enabled.
#[derive(Debug)]
pub struct DexCollector {
    client: ApiClient,
}

impl DexCollector {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Collector for DexCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Dex
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<(), CollectorError> {
        let started = Instant::now();
        let tests: Vec<DexTest> = self
            .client
            .get_paged(
                ctx.cancel_token(),
                &self.client.account_path("dex/devices/dex_tests"),
                &[],
            )
            .await?;

        for test in &tests {
            let series = SeriesSpec::new(DEX_TEST_ENABLED, DEX_TEST_ENABLED_HELP)
                .label("test_id", test.test_id.as_str())
                .label("name", test.name.as_str())
                .label("kind", test.data.kind.as_str())
                .label("host", test.data.host.as_str());
            ctx.set_gauge(&series, if test.enabled { 1.0 } else { 0.0 })?;
        }

        if ctx.debug() {
            tracing::info!(
                collector = "dex",
                tests = tests.len(),
                elapsed = ?started.elapsed(),
                "Fetched DEX tests"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::{TestContext, envelope};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_dex_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/acc/dex/devices/dex_tests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
                {
                    "test_id": "x1",
                    "name": "intranet",
                    "enabled": true,
                    "interval": "0h30m0s",
                    "data": { "kind": "http", "host": "https://intranet.example.com", "method": "GET" }
                },
                { "test_id": "x2", "name": "dns", "enabled": false, "data": { "kind": "traceroute", "host": "1.1.1.1" } }
            ]))))
            .mount(&server)
            .await;

        let t = TestContext::new(&server);
        DexCollector::new(t.client.clone())
            .collect(&t.ctx)
            .await
            .unwrap();

        let intranet = SeriesSpec::new(DEX_TEST_ENABLED, DEX_TEST_ENABLED_HELP)
            .label("test_id", "x1")
            .label("name", "intranet")
            .label("kind", "http")
            .label("host", "https://intranet.example.com");
        assert_eq!(t.registry.gauge_value(&intranet), Some(1.0));

        let dns = SeriesSpec::new(DEX_TEST_ENABLED, DEX_TEST_ENABLED_HELP)
            .label("test_id", "x2")
            .label("name", "dns")
            .label("kind", "traceroute")
            .label("host", "1.1.1.1");
        assert_eq!(t.registry.gauge_value(&dns), Some(0.0));
    }

    #[tokio::test]
    async fn test_dex_cancelled_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(json!([])))
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let t = TestContext::new(&server);
        t.ctx.cancel_token().cancel();
        let err = DexCollector::new(t.client.clone())
            .collect(&t.ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::Cancelled));
    }
}
