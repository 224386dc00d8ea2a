//! Session admission endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use serde::Serialize;

use crate::core::rate_limit::Admission;
use crate::errors::AdmissionError;
use crate::state::AppState;
use crate::streaming::CreateSessionRequest;

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub ws_url: String,
}

/// `POST /v1/tts/sessions`: validate, rate-limit and persist a new
/// pending session, returning the streaming URL for it.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AdmissionError> {
    // Origin key for admission control is the peer address.
    let origin = addr.ip().to_string();
    if let Admission::Denied { retry_after } = state.rate_limiter.admit(&origin) {
        return Err(AdmissionError::RateLimited {
            retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
        });
    }

    let session = state.tts.create_session(&req)?;

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| state.config.address());
    let ws_url = format!("ws://{host}/v1/tts/stream/{}", session.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            ws_url,
        }),
    ))
}
