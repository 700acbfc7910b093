//! Magic WAN collector.
//!
//! Runs two GraphQL analytics queries over the last complete five-minute
//! window:
//!
//! - [`state`]: tunnel health-check state per tunnel and colo
//! - [`bandwidth`]: average tunnel bit rate per tunnel and colo
//!
//! The bandwidth query runs even when the state query fails. GraphQL errors
//! are reported after whatever data came with them has been written.

mod bandwidth;
mod state;

use chrono::Utc;
use serde::Deserialize;
use tokio::time::Instant;

use crate::cloudflare::{ApiClient, five_minute_window};
use crate::collector::{Collector, CollectorError, CollectorKind, ScrapeContext};

/// Dimensions shared by both queries.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Dimensions {
    #[serde(default)]
    tunnel_name: String,
    #[serde(default)]
    edge_colo_name: String,
}

/// What one query wrote, plus any GraphQL errors it carried.
#[derive(Debug)]
struct QueryReport {
    tunnels: usize,
    errors: Option<String>,
}

/// Magic WAN tunnel state and bandwidth.
#[derive(Debug)]
pub struct MagicWanCollector {
    client: ApiClient,
}

impl MagicWanCollector {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn variables(&self) -> serde_json::Value {
        let (start, end) = five_minute_window(Utc::now());
        serde_json::json!({
            "accountTag": self.client.account_id(),
            "datetimeStart": start,
            "datetimeEnd": end,
        })
    }

    /// Fold one query's result into the collector's first error.
    fn settle(
        query: &'static str,
        started: Instant,
        result: Result<QueryReport, CollectorError>,
        debug: bool,
    ) -> Option<CollectorError> {
        match result {
            Ok(report) => {
                if debug {
                    tracing::info!(
                        collector = "magicwan",
                        query,
                        tunnels = report.tunnels,
                        elapsed = ?started.elapsed(),
                        "Fetched Magic WAN tunnels"
                    );
                }
                report.errors.map(|errors| {
                    tracing::warn!(
                        collector = "magicwan",
                        query,
                        errors = %errors,
                        "GraphQL returned errors"
                    );
                    CollectorError::Api(format!("{query}: {errors}"))
                })
            }
            Err(e) => {
                tracing::warn!(collector = "magicwan", query, error = %e, "GraphQL request failed");
                Some(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl Collector for MagicWanCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::MagicWan
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<(), CollectorError> {
        let started = Instant::now();
        let state_result = state::collect(&self.client, ctx, self.variables()).await;
        let state_error = Self::settle("state", started, state_result, ctx.debug());

        let started = Instant::now();
        let bandwidth_result = bandwidth::collect(&self.client, ctx, self.variables()).await;
        let bandwidth_error = Self::settle("bandwidth", started, bandwidth_result, ctx.debug());

        match state_error.or(bandwidth_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
