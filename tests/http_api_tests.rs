//! HTTP API tests
//!
//! Exercise the REST surface (admission, discovery, health, metrics)
//! against a fully wired gateway, without opening real sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use tts_gateway::{AppState, GatewayConfig, routes};

fn test_config() -> GatewayConfig {
    GatewayConfig {
        session_queue_worker_count: 1,
        ..GatewayConfig::default()
    }
}

async fn test_app(config: GatewayConfig) -> (Router, Arc<AppState>) {
    let (state, _pool) = AppState::new(config).await;
    (routes::create_router(Arc::clone(&state)), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, peer: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_body() -> Value {
    json!({
        "provider": "mock_tone",
        "voice": "en-US-mock-1",
        "text": "hi",
        "target_format": "pcm16",
        "sample_rate_hz": 16000
    })
}

// =============================================================================
// Health and discovery
// =============================================================================

#[tokio::test]
async fn test_healthz_returns_ok() {
    let (app, _state) = test_app(test_config()).await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_voices_lists_mock_catalog() {
    let (app, _state) = test_app(test_config()).await;

    let response = app.oneshot(get("/v1/voices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let voices = body["voices"].as_array().unwrap();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0]["id"], "en-US-mock-1");
    assert_eq!(voices[0]["provider"], "mock_tone");
    assert_eq!(voices[0]["language"], "en-US");
    assert_eq!(voices[0]["sample_rate_hz"], 16000);
    let formats = voices[0]["supported_formats"].as_array().unwrap();
    assert!(formats.contains(&json!("pcm16")));
    assert!(formats.contains(&json!("opus")));
}

#[tokio::test]
async fn test_voices_filters_by_provider_and_language() {
    let (app, _state) = test_app(test_config()).await;

    let response = app
        .clone()
        .oneshot(get("/v1/voices?provider=nope"))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await["voices"].as_array().unwrap().len(),
        0
    );

    let response = app.oneshot(get("/v1/voices?language=en-US")).await.unwrap();
    assert_eq!(
        body_json(response).await["voices"].as_array().unwrap().len(),
        1
    );
}

// =============================================================================
// Session admission
// =============================================================================

#[tokio::test]
async fn test_create_session_returns_201_with_stream_url() {
    let (app, state) = test_app(test_config()).await;

    let response = app
        .oneshot(post_json("/v1/tts/sessions", session_body(), "10.0.0.1:40000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let session_id = body["session_id"].as_str().unwrap();
    assert!(!session_id.is_empty());
    assert!(
        body["ws_url"]
            .as_str()
            .unwrap()
            .contains(&format!("/v1/tts/stream/{session_id}"))
    );

    let session = state.sessions.get(session_id).unwrap();
    assert_eq!(session.provider_id, "mock_tone");
    assert_eq!(session.text, "hi");
}

#[tokio::test]
async fn test_create_session_validation_errors() {
    let (app, _state) = test_app(test_config()).await;

    let cases = [
        (json!({ "provider": "mock_tone", "voice": "en-US-mock-1", "text": "   ",
                 "target_format": "pcm16", "sample_rate_hz": 16000 }),
         StatusCode::BAD_REQUEST),
        (json!({ "provider": "nope", "voice": "en-US-mock-1", "text": "hi",
                 "target_format": "pcm16", "sample_rate_hz": 16000 }),
         StatusCode::NOT_FOUND),
        (json!({ "provider": "mock_tone", "voice": "missing-voice", "text": "hi",
                 "target_format": "pcm16", "sample_rate_hz": 16000 }),
         StatusCode::NOT_FOUND),
        (json!({ "provider": "mock_tone", "voice": "en-US-mock-1", "text": "hi",
                 "target_format": "flac", "sample_rate_hz": 16000 }),
         StatusCode::BAD_REQUEST),
        (json!({ "provider": "mock_tone", "voice": "en-US-mock-1", "text": "hi",
                 "target_format": "pcm16", "sample_rate_hz": 0 }),
         StatusCode::BAD_REQUEST),
        (json!({ "provider": "mock_tone", "voice": "en-US-mock-1", "text": "hi",
                 "target_format": "pcm16", "sample_rate_hz": 400000 }),
         StatusCode::BAD_REQUEST),
    ];

    for (i, (body, expected)) in cases.into_iter().enumerate() {
        let peer = format!("10.1.0.{}:40000", i + 1);
        let response = app
            .clone()
            .oneshot(post_json("/v1/tts/sessions", body, &peer))
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "case {i}");
    }
}

#[tokio::test]
async fn test_rate_limit_caps_admissions_per_origin() {
    let config = GatewayConfig {
        rate_limit_max_requests_per_window: 2,
        rate_limit_window_seconds: 60,
        ..test_config()
    };
    let (app, _state) = test_app(config).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/v1/tts/sessions", session_body(), "10.2.0.1:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(post_json("/v1/tts/sessions", session_body(), "10.2.0.1:40000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after <= 60);

    // A different origin is unaffected.
    let response = app
        .oneshot(post_json("/v1/tts/sessions", session_body(), "10.2.0.2:40000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_exposes_gateway_series() {
    let (app, _state) = test_app(test_config()).await;

    // One admission so the created counter moves.
    let response = app
        .clone()
        .oneshot(post_json("/v1/tts/sessions", session_body(), "10.3.0.1:40000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("tts_sessions_total{status=\"created\"} 1"));
    assert!(text.contains("tts_session_queue_maxsize 100"));
    assert!(text.contains("tts_session_workers_total 1"));
    assert!(text.contains("tts_session_queue_depth 0"));
    assert!(text.contains("tts_rate_limit_max_bucket_usage"));
    assert!(text.contains("tts_rate_limit_window_remaining_seconds"));
}
