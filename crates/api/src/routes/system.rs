//! Health and Prometheus metrics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::{AppState, AppStore};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub transport: &'static str,
}

/// GET /health
///
/// Reports `degraded` with 503 once the transport has been closed.
pub async fn health<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    if state.transport.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                transport: "closed",
            }),
        );
    }
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            transport: "open",
        }),
    )
}

/// GET /metrics
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
