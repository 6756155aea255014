use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One player's performance in a match, as extracted from a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub user_id: Option<Uuid>,
    pub client_id: Option<i64>, // Client-local numeric player id
    pub total_questions: i32,
    pub correct_answers: i32,
    pub average_time: Option<f64>,
    pub topic_breakdown_json: Option<String>,
}

/// Database model for match_player_summaries table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MatchPlayerSummaryModel {
    pub match_result_id: i64,
    pub session_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<i64>,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub average_time: Option<f64>,
    pub topic_breakdown_json: Option<String>,
}

impl MatchPlayerSummaryModel {
    pub fn from_summary(
        match_result_id: i64,
        session_id: Option<Uuid>,
        summary: &PlayerSummary,
    ) -> Self {
        Self {
            match_result_id,
            session_id,
            user_id: summary.user_id,
            client_id: summary.client_id,
            total_questions: summary.total_questions,
            correct_answers: summary.correct_answers,
            average_time: summary.average_time,
            topic_breakdown_json: summary.topic_breakdown_json.clone(),
        }
    }
}
