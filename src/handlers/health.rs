use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe; returns 200 whenever the server is accepting traffic.
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_body() {
        let response = healthz().await;
        assert_eq!(
            serde_json::to_string(&response.0).unwrap(),
            r#"{"status":"ok"}"#
        );
    }
}
