use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Source type attached to every reward emitted for a match
pub const REWARD_SOURCE_TYPE: &str = "BossFight";

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SubjectModel {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SubjectSkillMappingModel {
    pub subject_id: Uuid,
    pub skill_id: Uuid,
    pub relevance_weight: f64,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SkillModel {
    pub id: Uuid,
    pub name: String,
}

/// Request to the XP ingestion collaborator to award points for one skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEvent {
    pub user_id: Uuid,
    pub skill_id: Uuid,
    pub points: i64,
    pub source_type: String,
    pub source_id: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}
