//! Streaming WebSocket endpoint.
//!
//! Upgrades the connection, hands the sender half to a queued work item
//! and watches the receiver half for the client going away. The server is
//! the only sender; anything the client says after connecting is ignored
//! except as a liveness signal.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::streaming::SessionWorkItem;
use crate::transport::{StreamFrame, StreamTransport, WsTransport, close_code};

/// `GET /v1/tts/stream/{session_id}`: upgrade and enqueue the session
/// for streaming.
pub async fn stream_tts(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    info!(session_id, "stream connection established");

    let (sender, mut receiver) = socket.split();
    let cancel = CancellationToken::new();

    // Watch the client half. A close frame, a transport error or EOF all
    // mean the peer is gone; fire the work item's cancellation token so
    // the pipeline stops at its next checkpoint.
    let watcher_cancel = cancel.clone();
    let watcher_session = session_id.clone();
    tokio::spawn(async move {
        loop {
            match receiver.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {
                    debug!(session_id = %watcher_session, "ignoring client message");
                }
            }
        }
        watcher_cancel.cancel();
    });

    let mut transport = WsTransport::new(sender);

    if state.sessions.get(&session_id).is_none() {
        warn!(session_id, "stream requested for unknown session");
        let _ = transport
            .send(StreamFrame::error(
                400,
                format!("unknown session '{session_id}'"),
            ))
            .await;
        transport.close(close_code::BAD_REQUEST).await;
        return;
    }

    let item = SessionWorkItem {
        session_id: session_id.clone(),
        transport: Box::new(transport),
        cancel,
    };
    if let Err(mut rejected) = state.queue.try_enqueue(item) {
        let _ = rejected
            .transport
            .send(StreamFrame::error(503, "session queue full"))
            .await;
        rejected.transport.close(close_code::TRY_AGAIN_LATER).await;
    }
}
