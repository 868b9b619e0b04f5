//! tokenwatch-api: HTTP surface of the exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of the current snapshot |
//! | GET | `/healthz` | Liveness probe |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokenwatch_metrics::SnapshotStore;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<SnapshotStore>,
}

/// Build the router serving the given snapshot store.
pub fn build_router(metrics: Arc<SnapshotStore>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(ApiState { metrics })
}
