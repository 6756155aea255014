use axum::{body::Bytes, extract::State, Json};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::types::IngestResponse;
use crate::shared::{AppError, AppState};

/// HTTP handler for submitting a finished match
///
/// POST /match-results
/// Accepts any body; anything that is not valid JSON is ingested as an empty payload
#[instrument(name = "ingest_match_result", skip(state, body), fields(body_len = body.len()))]
pub async fn ingest_match_result(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let raw = serde_json::from_slice::<Value>(&body).unwrap_or_else(|err| {
        warn!(error = %err, "Match submission is not valid JSON, using defaults");
        Value::Null
    });

    let outcome = state.ingest_service.ingest(&raw).await?;
    let response = outcome.to_response();

    info!(
        match_id = %response.match_id,
        session_id = ?response.session_id,
        "Match result accepted"
    );

    Ok(Json(response))
}
