//! Liveness and metrics endpoints

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};

/// Handle `GET /healthz`
pub(crate) async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Handle `GET /metrics`, rendering the registry in the Prometheus text
/// exposition format
pub(crate) async fn metrics_handler(State(registry): State<prometheus::Registry>) -> Response {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    if let Err(err) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "metrics encoding failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}
