//! Metrics exposition endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

/// `GET /metrics`: Prometheus-compatible text exposition.
pub async fn metrics(State(state): State<Arc<crate::state::AppState>>) -> impl IntoResponse {
    let body = state.metrics.render(
        state.rate_limiter.max_bucket_usage(),
        state.rate_limiter.min_window_remaining_secs(),
    );
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
