use serde::{Deserialize, Serialize};

/// Response body for `POST /match-results`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub match_id: String,
    pub session_id: Option<String>, // null when no session was linked
}
