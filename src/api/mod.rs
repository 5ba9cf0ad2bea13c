//! API routes and handlers

pub mod resolve;

use crate::{context::AppContext, metrics};
use axum::{
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/resolve", get(resolve::resolve_did))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus scrape endpoint
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
