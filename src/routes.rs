//! Router assembly.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, metrics, sessions, stream, voices};
use crate::state::AppState;

/// Build the full gateway router: REST admission/discovery endpoints plus
/// the streaming WebSocket endpoint.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/voices", get(voices::list_voices))
        .route("/v1/tts/sessions", post(sessions::create_session))
        .route("/v1/tts/stream/{session_id}", get(stream::stream_tts))
        .route("/metrics", get(metrics::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
