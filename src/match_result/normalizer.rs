use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{match_data::MatchData, models::MatchOutcome};
use crate::json_fields::{as_int, as_text, as_utc, as_uuid, field};

/// Generates match ids for submissions that arrive without one
pub trait MatchIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4-based match id generator
pub struct UuidMatchIdGenerator;

impl MatchIdGenerator for UuidMatchIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Canonical form of an inbound match submission
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCommand {
    pub match_id: String,
    pub result: MatchOutcome,
    pub join_code: Option<String>,
    pub scene: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub total_players: i32,
    pub user_id: Option<Uuid>,
    /// The submission as received, re-serialized
    pub raw_json: String,
    /// The submission decoded as a match-data document, carrying only what the client sent plus the match id
    pub match_data: MatchData,
}

/// Turns arbitrary JSON into a `MatchCommand`, defaulting everything that is missing or unusable
pub struct PayloadNormalizer {
    id_generator: Arc<dyn MatchIdGenerator>,
    default_duration: Duration,
}

impl PayloadNormalizer {
    pub fn new(default_duration_minutes: i64) -> Self {
        Self::with_generator(Arc::new(UuidMatchIdGenerator), default_duration_minutes)
    }

    pub fn with_generator(
        id_generator: Arc<dyn MatchIdGenerator>,
        default_duration_minutes: i64,
    ) -> Self {
        Self {
            id_generator,
            default_duration: Duration::minutes(default_duration_minutes),
        }
    }

    pub fn normalize(&self, raw: &Value, now: DateTime<Utc>) -> MatchCommand {
        let empty = serde_json::Map::new();
        let object = raw.as_object().unwrap_or(&empty);
        if raw.as_object().is_none() {
            debug!("Match payload is not a JSON object, using defaults");
        }

        let match_id = field(object, "matchId")
            .and_then(as_text)
            .unwrap_or_else(|| self.id_generator.generate());

        let reported_total = field(object, "totalPlayers")
            .and_then(as_int)
            .filter(|n| *n > 0)
            .unwrap_or(0);
        let total_players = if reported_total > 0 {
            reported_total
        } else {
            inferred_player_count(object)
        };

        let mut match_data = MatchData::from_value(raw);
        match_data.match_id = Some(match_id.clone());

        MatchCommand {
            result: MatchOutcome::from_reported(field(object, "result").and_then(Value::as_str)),
            join_code: field(object, "joinCode").and_then(as_text),
            scene: field(object, "scene")
                .and_then(as_text)
                .unwrap_or_else(|| "unknown".to_string()),
            start_utc: field(object, "startUtc")
                .and_then(as_utc)
                .unwrap_or(now - self.default_duration),
            end_utc: field(object, "endUtc").and_then(as_utc).unwrap_or(now),
            total_players: i32::try_from(total_players).unwrap_or(i32::MAX),
            user_id: field(object, "userId").and_then(as_uuid),
            raw_json: serde_json::to_string(raw).unwrap_or_else(|_| "{}".to_string()),
            match_id,
            match_data,
        }
    }
}

fn inferred_player_count(object: &serde_json::Map<String, Value>) -> i64 {
    let len = |key: &str| {
        field(object, key)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    };
    let per_player = len("per_player");
    let count = if per_player > 0 {
        per_player
    } else {
        len("playerSummaries")
    };
    count as i64
}
