use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

use match_ingest::match_result::IngestResponse;

use super::setup::TestSetup;

// ============================================================================
// Test Actions
// ============================================================================

impl TestSetup {
    /// Posts a raw body to `/match-results`
    pub async fn post_raw(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/match-results")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Submits a payload and expects a successful response
    pub async fn submit(&self, payload: Value) -> IngestResponse {
        let (status, body) = self.post_raw(payload.to_string()).await;
        assert_eq!(status, StatusCode::OK, "unexpected response {body}");
        serde_json::from_value(body).unwrap()
    }
}
