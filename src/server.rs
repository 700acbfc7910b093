//! Web server module for the exporter.
//!
//! `GET /metrics` runs one scrape and returns the text exposition;
//! `GET /healthz` reports that the process is up.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::metrics::TEXT_CONTENT_TYPE;
use crate::scrape::{Exposition, Scraper};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    collectors: Vec<String>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        collectors: state
            .scraper
            .collectors()
            .kinds()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

/// Scrape endpoint.
///
/// The scrape runs on its own task. Dropping this future (client disconnect)
/// cancels the request token, so the collectors wind down cooperatively and
/// the detached scrape finishes with [`Exposition::Skipped`].
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let request = CancellationToken::new();
    let _disconnect = request.clone().drop_guard();

    let scraper = Arc::clone(&state.scraper);
    let outcome = match tokio::spawn(async move { scraper.scrape(&request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Scrape task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response();
        }
    };

    match outcome.exposition {
        Exposition::Rendered(body) => {
            ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
        }
        Exposition::Skipped => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Exposition::Failed(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}
