//! Framed transport to the client.
//!
//! Every frame is one JSON object per transport message. The server is
//! the only sender; the client may close at any time, which surfaces as
//! the work item's cancellation token firing. The production transport
//! wraps the sender half of an axum WebSocket; tests substitute a
//! recording transport.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::SinkExt;
use futures::stream::SplitSink;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// WebSocket close codes used by the core.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const TRY_AGAIN_LATER: u16 = 1013;
    pub const BAD_REQUEST: u16 = 4400;
    pub const FORBIDDEN: u16 = 4403;
}

/// Envelope written to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// One transcoded audio chunk. `seq` starts at 1 and increments by 1
    /// per successfully-sent frame.
    Audio { seq: u32, data: String },
    /// Exactly one per successful session.
    Eos,
    /// Exactly one per failed session; the server closes afterwards.
    Error { code: u16, message: String },
}

impl StreamFrame {
    pub fn audio(seq: u32, payload: &[u8]) -> Self {
        StreamFrame::Audio {
            seq,
            data: BASE64.encode(payload),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        StreamFrame::Error {
            code,
            message: message.into(),
        }
    }
}

/// The peer is gone; no further frames can be delivered.
#[derive(Debug, Clone, Error)]
#[error("transport closed by peer")]
pub struct TransportClosed;

/// Framed bidirectional connection as seen by the streaming worker.
///
/// The worker that dequeues a session owns its transport and must close
/// it on every exit path.
#[async_trait]
pub trait StreamTransport: Send {
    async fn send(&mut self, frame: StreamFrame) -> Result<(), TransportClosed>;

    /// Best-effort close with the given code. Errors are ignored; the
    /// peer may already be gone.
    async fn close(&mut self, code: u16);
}

/// Production transport over the sender half of an axum WebSocket.
pub struct WsTransport {
    sender: SplitSink<WebSocket, Message>,
}

impl WsTransport {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn send(&mut self, frame: StreamFrame) -> Result<(), TransportClosed> {
        let json = serde_json::to_string(&frame).map_err(|_| TransportClosed)?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| TransportClosed)
    }

    async fn close(&mut self, code: u16) {
        let _ = self
            .sender
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_wire_shape() {
        let frame = StreamFrame::audio(1, b"abc");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["seq"], 1);
        assert_eq!(json["data"], "YWJj");
    }

    #[test]
    fn test_eos_frame_wire_shape() {
        let json = serde_json::to_string(&StreamFrame::Eos).unwrap();
        assert_eq!(json, r#"{"type":"eos"}"#);
    }

    #[test]
    fn test_error_frame_wire_shape() {
        let frame = StreamFrame::error(503, "provider_unavailable");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], 503);
        assert_eq!(json["message"], "provider_unavailable");
    }

    #[test]
    fn test_frames_round_trip() {
        for frame in [
            StreamFrame::audio(7, &[0, 1, 2]),
            StreamFrame::Eos,
            StreamFrame::error(500, "transcode_failed"),
        ] {
            let json = serde_json::to_string(&frame).unwrap();
            let back: StreamFrame = serde_json::from_str(&json).unwrap();
            assert_eq!(back, frame);
        }
    }
}
