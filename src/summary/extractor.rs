//! Per-player summaries from a raw match submission.
//!
//! Clients send one of two shapes, sometimes both:
//!
//! * `per_player`: `{ user_id, client_id, summary: { topics: [{ total, correct }] } }`
//! * `playerSummaries`: `{ playerId, userId, totalQuestions, correctAnswers, averageTime, topicBreakdown }`
//!
//! Entries that fail to decode are skipped one by one. If nothing usable is
//! found a single zeroed placeholder is returned.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::models::PlayerSummary;
use crate::json_fields::{as_float, as_int, as_uuid, field};

#[derive(Debug, Deserialize)]
struct PerPlayerEntry {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    client_id: Option<Value>,
    #[serde(default)]
    summary: Option<PerPlayerBody>,
}

#[derive(Debug, Default, Deserialize)]
struct PerPlayerBody {
    #[serde(default)]
    topics: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerSummaryEntry {
    #[serde(default)]
    player_id: Option<Value>,
    #[serde(default)]
    client_id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    total_questions: Option<Value>,
    #[serde(default)]
    correct_answers: Option<Value>,
    #[serde(default)]
    average_time: Option<Value>,
    #[serde(default)]
    topic_breakdown: Option<Value>,
}

/// Extracts summaries from `raw`. `default_user_id` (usually the session
/// owner) fills in players without an explicit user id, before the payload's
/// root-level `userId`.
pub fn extract_player_summaries(raw: &Value, default_user_id: Option<Uuid>) -> Vec<PlayerSummary> {
    let root_user_id = raw
        .as_object()
        .and_then(|object| field(object, "userId"))
        .and_then(as_uuid);
    let fallback_user = default_user_id.or(root_user_id);

    let mut summaries: Vec<PlayerSummary> = entries(raw, "per_player")
        .filter_map(|entry| decode::<PerPlayerEntry>(entry, "per_player"))
        .map(|entry| from_per_player(entry, fallback_user))
        .collect();

    summaries.extend(
        entries(raw, "playerSummaries")
            .filter_map(|entry| decode::<PlayerSummaryEntry>(entry, "playerSummaries"))
            .map(|entry| from_player_summary(entry, fallback_user)),
    );

    if summaries.is_empty() {
        debug!("No player summaries in payload, emitting placeholder");
        summaries.push(PlayerSummary {
            user_id: fallback_user,
            ..PlayerSummary::default()
        });
    }

    summaries
}

fn entries<'a>(raw: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    raw.as_object()
        .and_then(|object| field(object, key))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn decode<T: for<'de> Deserialize<'de>>(entry: &Value, schema: &str) -> Option<T> {
    match T::deserialize(entry) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            debug!(schema, error = %err, "Skipping undecodable player entry");
            None
        }
    }
}

fn from_per_player(entry: PerPlayerEntry, fallback_user: Option<Uuid>) -> PlayerSummary {
    let topics = entry.summary.unwrap_or_default().topics;
    let (total, correct) = sum_topics(&topics);

    PlayerSummary {
        user_id: entry.user_id.as_ref().and_then(as_uuid).or(fallback_user),
        client_id: entry.client_id.as_ref().and_then(as_int),
        total_questions: total,
        correct_answers: correct,
        average_time: None,
        topic_breakdown_json: (!topics.is_empty())
            .then(|| Value::Array(topics).to_string()),
    }
}

fn from_player_summary(entry: PlayerSummaryEntry, fallback_user: Option<Uuid>) -> PlayerSummary {
    let mut total = count(entry.total_questions.as_ref());
    let mut correct = count(entry.correct_answers.as_ref());

    let breakdown = entry.topic_breakdown.filter(|v| !v.is_null());
    if total == 0 && correct == 0 {
        if let Some(Value::Array(topics)) = &breakdown {
            (total, correct) = sum_topics(topics);
        }
    }

    PlayerSummary {
        user_id: entry.user_id.as_ref().and_then(as_uuid).or(fallback_user),
        client_id: entry
            .client_id
            .as_ref()
            .and_then(as_int)
            .or_else(|| entry.player_id.as_ref().and_then(as_int)),
        total_questions: total,
        correct_answers: correct,
        average_time: entry.average_time.as_ref().and_then(as_float),
        topic_breakdown_json: breakdown.map(|v| v.to_string()),
    }
}

/// Sums `total`/`correct` (or `totalQuestions`/`correctAnswers`) over topic
/// rows, saturating at `i32::MAX`
fn sum_topics(topics: &[Value]) -> (i32, i32) {
    let (total, correct) = topics
        .iter()
        .filter_map(Value::as_object)
        .fold((0i64, 0i64), |(total, correct), topic| {
            let read = |primary: &str, alternate: &str| {
                i64::from(count(field(topic, primary).or_else(|| field(topic, alternate))))
            };
            (
                total.saturating_add(read("total", "totalQuestions")),
                correct.saturating_add(read("correct", "correctAnswers")),
            )
        });
    (clamp_count(total), clamp_count(correct))
}

fn clamp_count(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn count(value: Option<&Value>) -> i32 {
    value
        .and_then(as_int)
        .map(|n| clamp_count(n.max(0)))
        .unwrap_or(0)
}
