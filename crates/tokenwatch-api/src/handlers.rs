//! HTTP handlers.
//!
//! Handlers only read the snapshot store; scraping never triggers a
//! collection cycle.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use tracing::trace;

use tokenwatch_metrics::{CONTENT_TYPE, render_prometheus};

use crate::ApiState;

/// Body of `/healthz`.
#[derive(Debug, serde::Serialize)]
struct Health {
    status: &'static str,
    /// Number of gauge values currently held.
    samples: usize,
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot().await;
    trace!(samples = snapshot.samples.len(), "rendering scrape");

    let body = render_prometheus(&snapshot);
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    let samples = state.metrics.snapshot().await.samples.len();
    Json(Health {
        status: "ok",
        samples,
    })
}
