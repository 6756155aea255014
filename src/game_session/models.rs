use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status written to a session once a match result has been linked to it
pub const COMPLETED_STATUS: &str = "completed";

/// Database model for game_sessions table
///
/// Sessions are created by the session-management feature; ingest only reads
/// them and fills in the completion fields.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct GameSessionModel {
    pub session_id: Uuid,
    pub join_code: Option<String>,
    pub subject: Option<String>, // Subject code driving skill rewards
    pub question_pack_json: Option<String>,
    pub status: String,
    pub match_result_id: Option<i64>, // Back-reference, first successful link wins
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GameSessionModel {
    /// Creates an open session with a fresh id
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            join_code: None,
            subject: None,
            question_pack_json: None,
            status: "active".to_string(),
            match_result_id: None,
            user_id: None,
            created_at,
            completed_at: None,
        }
    }

    /// The instant the session ended, or when it started if it never completed
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    pub fn is_linked(&self) -> bool {
        self.match_result_id.is_some()
    }

    /// Subject code, if non-blank
    pub fn subject_code(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}
