//! Error taxonomy for the gateway.
//!
//! Admission errors map to HTTP status codes on the REST surface;
//! stream errors map to a terminal `error` frame plus a close code on
//! the framed transport.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::core::providers::ProviderError;
use crate::core::transcode::TranscodeError;
use crate::transport::{StreamFrame, close_code};

/// Errors raised while admitting a new session.
#[derive(Debug, Clone, Error)]
pub enum AdmissionError {
    #[error("{0}")]
    Validation(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("unknown voice '{0}'")]
    UnknownVoice(String),

    #[error("rate limit exceeded for this client")]
    RateLimited { retry_after_secs: u64 },
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = match self {
            AdmissionError::Validation(_) => StatusCode::BAD_REQUEST,
            AdmissionError::UnknownProvider(_) | AdmissionError::UnknownVoice(_) => {
                StatusCode::NOT_FOUND
            }
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        };
        let mut response =
            (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let AdmissionError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Errors terminating a streaming session.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("session '{0}' was already streamed")]
    AlreadyConsumed(String),

    #[error("provider circuit open")]
    CircuitOpen,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("provider failed mid-stream")]
    ProviderMidStream,

    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("client cancelled")]
    Cancelled,

    #[error("gateway shutting down")]
    ShuttingDown,
}

impl StreamError {
    /// Terminal frame to deliver before closing, if any. Client-side
    /// cancellation gets no terminal frame.
    pub fn terminal_frame(&self) -> Option<StreamFrame> {
        match self {
            StreamError::UnknownSession(id) => {
                Some(StreamFrame::error(400, format!("unknown session '{id}'")))
            }
            StreamError::AlreadyConsumed(_) => {
                Some(StreamFrame::error(400, "session already streamed"))
            }
            StreamError::CircuitOpen => Some(StreamFrame::error(503, "provider_unavailable")),
            StreamError::Provider(_) => Some(StreamFrame::error(502, "provider_error")),
            StreamError::ProviderMidStream => {
                Some(StreamFrame::error(502, "provider_mid_stream"))
            }
            StreamError::Transcode(_) => Some(StreamFrame::error(500, "transcode_failed")),
            StreamError::Cancelled => None,
            StreamError::ShuttingDown => Some(StreamFrame::error(503, "shutting_down")),
        }
    }

    /// Close code for the transport after the terminal frame.
    pub fn close_code(&self) -> u16 {
        match self {
            StreamError::UnknownSession(_) | StreamError::AlreadyConsumed(_) => {
                close_code::BAD_REQUEST
            }
            StreamError::CircuitOpen | StreamError::ShuttingDown => close_code::TRY_AGAIN_LATER,
            StreamError::Provider(_)
            | StreamError::ProviderMidStream
            | StreamError::Transcode(_) => close_code::INTERNAL_ERROR,
            StreamError::Cancelled => close_code::NORMAL,
        }
    }

    /// Short reason recorded on the failed session.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            StreamError::UnknownSession(_) => "unknown_session",
            StreamError::AlreadyConsumed(_) => "already_streamed",
            StreamError::CircuitOpen => "provider_unavailable",
            StreamError::Provider(_) => "provider_error",
            StreamError::ProviderMidStream => "provider_mid_stream",
            StreamError::Transcode(_) => "transcode_failed",
            StreamError::Cancelled => "client_cancelled",
            StreamError::ShuttingDown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_status_codes() {
        assert_eq!(
            AdmissionError::Validation("x".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdmissionError::UnknownProvider("p".into())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        let response = AdmissionError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(42u64)
        );
    }

    #[test]
    fn test_stream_error_frames_and_close_codes() {
        let open = StreamError::CircuitOpen;
        assert_eq!(
            open.terminal_frame(),
            Some(StreamFrame::error(503, "provider_unavailable"))
        );
        assert_eq!(open.close_code(), close_code::TRY_AGAIN_LATER);

        let cancelled = StreamError::Cancelled;
        assert_eq!(cancelled.terminal_frame(), None);
        assert_eq!(cancelled.close_code(), close_code::NORMAL);

        let mid = StreamError::ProviderMidStream;
        assert_eq!(
            mid.terminal_frame(),
            Some(StreamFrame::error(502, "provider_mid_stream"))
        );
        assert_eq!(mid.close_code(), close_code::INTERNAL_ERROR);
    }
}
