use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Outcome of a match as reported by the game client
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MatchOutcome {
    Win,
    Lose,
}

impl MatchOutcome {
    /// Only the exact literal `"win"` counts as a win; anything else is a loss
    pub fn from_reported(value: Option<&str>) -> Self {
        match value {
            Some("win") => MatchOutcome::Win,
            _ => MatchOutcome::Lose,
        }
    }

    /// Reads a stored value; unknown values are treated as a loss
    pub fn from_stored(value: &str) -> Self {
        MatchOutcome::from_str(value.trim()).unwrap_or(MatchOutcome::Lose)
    }

    pub fn is_win(&self) -> bool {
        matches!(self, MatchOutcome::Win)
    }
}

/// Database model for match_results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultModel {
    pub id: i64, // Surrogate identity; 0 for a row that was never persisted
    pub match_id: String, // External id from the game client, unique
    pub result: MatchOutcome,
    pub scene: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub total_players: i32,
    pub user_id: Option<Uuid>,
    pub match_data_json: String,
}

/// A match result that has not been assigned an identity yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatchResult {
    pub match_id: String,
    pub result: MatchOutcome,
    pub scene: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub total_players: i32,
    pub user_id: Option<Uuid>,
    pub match_data_json: String,
}

impl NewMatchResult {
    pub fn with_id(&self, id: i64) -> MatchResultModel {
        MatchResultModel {
            id,
            match_id: self.match_id.clone(),
            result: self.result,
            scene: self.scene.clone(),
            start_utc: self.start_utc,
            end_utc: self.end_utc,
            total_players: self.total_players,
            user_id: self.user_id,
            match_data_json: self.match_data_json.clone(),
        }
    }
}
