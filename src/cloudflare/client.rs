//! Cloudflare API client shared by all collectors.

use std::future::Future;

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::types::{Envelope, GraphqlResponse};
use crate::collector::CollectorError;
use crate::config::CloudflareConfig;
use crate::metrics::AppMetrics;

/// Length of the GraphQL analytics window, in minutes.
const ANALYTICS_WINDOW_MINUTES: i64 = 5;

/// Thin wrapper over [`reqwest::Client`] for the v4 REST and GraphQL APIs.
///
/// Every call counts towards `zerotrust_exporter_api_calls_total`; every
/// failed call also counts towards `zerotrust_exporter_api_errors_total`.
/// All waits are raced against the caller's cancellation token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    api_token: String,
    account_id: String,
    base_url: String,
    graphql_url: String,
    page_size: u32,
    metrics: AppMetrics,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns `CollectorError::Network` if the HTTP client cannot be built.
    pub fn new(config: &CloudflareConfig, metrics: AppMetrics) -> Result<Self, CollectorError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("zerotrust-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_token: config.api_token.clone(),
            account_id: config.account_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url.clone(),
            page_size: config.page_size,
            metrics,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Path of an account-scoped resource, e.g. `accounts/{id}/devices`.
    pub fn account_path(&self, resource: &str) -> String {
        format!("accounts/{}/{}", self.account_id, resource)
    }

    /// Fetch every page of a v4 list endpoint.
    ///
    /// Pages are requested with `page`/`per_page` until `result_info.total_pages`
    /// is reached; responses without pagination info are treated as a single page.
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, CollectorError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = self
                .http
                .get(&url)
                .bearer_auth(&self.api_token)
                .query(query)
                .query(&[("page", page), ("per_page", self.page_size)]);

            let (batch, info) = self
                .counted(async {
                    let envelope: Envelope<Vec<T>> = self.execute(cancel, request).await?;
                    envelope.into_result()
                })
                .await?;

            let received = batch.len();
            items.extend(batch);

            let total_pages = info.and_then(|i| i.total_pages).unwrap_or(1);
            if page >= total_pages || received == 0 {
                break;
            }
            page += 1;
        }

        tracing::trace!(path = %path, items = items.len(), pages = page, "Fetched list");
        Ok(items)
    }

    /// Run a GraphQL query.
    ///
    /// GraphQL `errors` are returned alongside any `data` so the caller can
    /// write what arrived before treating the call as failed. They still
    /// count as an API error.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphqlResponse<T>, CollectorError> {
        let request = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "query": query, "variables": variables }));

        let response: GraphqlResponse<T> = self.counted(self.execute(cancel, request)).await?;
        if response.has_errors() {
            self.metrics.inc_api_errors();
        }
        Ok(response)
    }

    // --- Private helpers ---

    async fn counted<R>(
        &self,
        call: impl Future<Output = Result<R, CollectorError>>,
    ) -> Result<R, CollectorError> {
        self.metrics.inc_api_calls();
        let result = call.await;
        if result.is_err() {
            self.metrics.inc_api_errors();
        }
        result
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        request: RequestBuilder,
    ) -> Result<R, CollectorError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollectorError::Unauthorized(status.as_u16()));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
            body = response.bytes() => body?,
        };

        // Error envelopes come with non-2xx statuses; prefer their message.
        match serde_json::from_slice(&body) {
            Ok(decoded) => Ok(decoded),
            Err(_) if !status.is_success() => Err(CollectorError::Status(status.as_u16())),
            Err(e) => Err(CollectorError::Decode(e)),
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("graphql_url", &self.graphql_url)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// The last complete five-minute window before `now`.
///
/// `end` is `now` truncated to five minutes and `start` is five minutes
/// earlier. Both are formatted as RFC 3339 with second precision.
pub fn five_minute_window(now: DateTime<Utc>) -> (String, String) {
    let window = TimeDelta::minutes(ANALYTICS_WINDOW_MINUTES);
    let end = now.duration_trunc(window).unwrap_or(now);
    let start = end - window;
    (
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
