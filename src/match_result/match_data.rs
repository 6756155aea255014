use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::json_fields::{as_int, as_key, as_text, as_utc, field};

const KNOWN_KEYS: [&str; 16] = [
    "matchId",
    "result",
    "scene",
    "relayRegion",
    "joinCode",
    "hostClientId",
    "userId",
    "sessionId",
    "totalPlayers",
    "startUtc",
    "endUtc",
    "clientIds",
    "per_player",
    "playerSummaries",
    "questions",
    "questionPack",
];

/// Keys probed, in order, to identify a player entry
const PLAYER_KEY_FIELDS: [&str; 4] = ["playerId", "user_id", "userId", "client_id"];

/// Typed view of the match-data document stored alongside a match result.
///
/// Every field is optional because the client may send any subset. Keys the
/// service does not interpret are carried in `extra` so that merging two
/// documents never drops information. Serialization order is fixed (fields in
/// declaration order, then `extra` sorted by key), which keeps merged output
/// byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_client_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_players: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub client_ids: Vec<i64>,
    #[serde(rename = "per_player", skip_serializing_if = "Vec::is_empty")]
    pub per_player: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub player_summaries: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_pack: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MatchData {
    /// Decodes a document leniently. Non-objects decode to an empty document and
    /// known keys with an unusable type are dropped.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(object) => Self::from_object(object),
            None => Self::default(),
        }
    }

    /// Decodes stored document text; malformed text yields an empty document
    pub fn from_json_str(text: &str) -> Self {
        serde_json::from_str::<Value>(text)
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }

    /// A document carrying only a question pack
    pub fn with_question_pack(pack: Value) -> Self {
        Self {
            question_pack: Some(pack),
            ..Self::default()
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| field(object, key).and_then(as_text);
        let array = |key: &str| {
            field(object, key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        let client_ids = field(object, "clientIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(as_int).collect())
            .unwrap_or_default();

        let extra = object
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            match_id: text("matchId"),
            result: text("result"),
            scene: text("scene"),
            relay_region: text("relayRegion"),
            join_code: text("joinCode"),
            host_client_id: field(object, "hostClientId")
                .filter(|v| v.is_number() || v.is_string())
                .cloned(),
            user_id: text("userId"),
            session_id: field(object, "sessionId").and_then(as_key),
            total_players: field(object, "totalPlayers").and_then(as_int),
            start_utc: field(object, "startUtc").and_then(as_utc),
            end_utc: field(object, "endUtc").and_then(as_utc),
            client_ids,
            per_player: array("per_player"),
            player_summaries: array("playerSummaries"),
            questions: array("questions"),
            question_pack: field(object, "questionPack")
                .filter(|v| v.is_object())
                .cloned(),
            extra,
        }
    }

    pub fn to_json_string(&self) -> String {
        // Only string keys and JSON values are involved, so this cannot fail in practice
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Merges two documents describing the same match into a new one.
///
/// Player lists are unioned by player key (incoming wins on collision), client
/// ids are unioned and sorted, the longer question list is kept, an existing
/// question pack is never replaced, scalars prefer the incoming value, the
/// player count takes the maximum and the time window widens to cover both.
pub fn merge(existing: &MatchData, incoming: &MatchData) -> MatchData {
    let questions = if incoming.questions.len() > existing.questions.len() {
        incoming.questions.clone()
    } else {
        existing.questions.clone()
    };

    let client_ids: BTreeSet<i64> = existing
        .client_ids
        .iter()
        .chain(incoming.client_ids.iter())
        .copied()
        .collect();

    let mut extra = existing.extra.clone();
    extra.extend(incoming.extra.clone());

    MatchData {
        match_id: prefer(&incoming.match_id, &existing.match_id),
        result: prefer(&incoming.result, &existing.result),
        scene: prefer(&incoming.scene, &existing.scene),
        relay_region: prefer(&incoming.relay_region, &existing.relay_region),
        join_code: prefer(&incoming.join_code, &existing.join_code),
        host_client_id: prefer(&incoming.host_client_id, &existing.host_client_id),
        user_id: prefer(&incoming.user_id, &existing.user_id),
        session_id: prefer(&incoming.session_id, &existing.session_id),
        total_players: combine(existing.total_players, incoming.total_players, i64::max),
        start_utc: combine(existing.start_utc, incoming.start_utc, DateTime::min),
        end_utc: combine(existing.end_utc, incoming.end_utc, DateTime::max),
        client_ids: client_ids.into_iter().collect(),
        per_player: merge_players(&existing.per_player, &incoming.per_player),
        player_summaries: merge_players(&existing.player_summaries, &incoming.player_summaries),
        questions,
        question_pack: existing
            .question_pack
            .clone()
            .or_else(|| incoming.question_pack.clone()),
        extra,
    }
}

fn prefer<T: Clone>(incoming: &Option<T>, existing: &Option<T>) -> Option<T> {
    incoming.clone().or_else(|| existing.clone())
}

fn combine<T: Copy>(a: Option<T>, b: Option<T>, pick: fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

fn merge_players(existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut by_key: BTreeMap<String, Value> = BTreeMap::new();
    for entry in existing.iter().chain(incoming) {
        by_key.insert(player_key(entry), entry.clone());
    }
    by_key.into_values().collect()
}

/// Entries without an identifier are keyed by their own content, so identical
/// anonymous entries collapse and different ones are all kept.
fn player_key(entry: &Value) -> String {
    entry
        .as_object()
        .and_then(|object| {
            PLAYER_KEY_FIELDS
                .iter()
                .find_map(|key| field(object, key).and_then(as_key))
        })
        .unwrap_or_else(|| format!("~{}", entry))
}
