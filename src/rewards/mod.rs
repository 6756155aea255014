pub mod engine;
pub mod errors;
pub mod models;
pub mod repository;

pub use engine::SkillRewardEngine;
pub use errors::RewardError;
pub use models::{RewardEvent, SkillModel, SubjectModel, SubjectSkillMappingModel};
pub use repository::{
    InMemoryRewardSink, InMemorySkillRepository, InMemorySubjectRepository,
    InMemorySubjectSkillMappingRepository, LoggingRewardSink, PostgresSkillCatalogRepository,
    RewardSink, SkillRepository,
    SubjectRepository, SubjectSkillMappingRepository,
};

/// Factors applied when converting a player's answers into XP, in whole
/// percent so the products stay exact
pub mod reward_factors {
    pub const XP_PER_QUESTION: i64 = 5;
    pub const XP_PER_CORRECT_ANSWER: i64 = 5;

    pub const WIN_PERCENT: i64 = 115;
    pub const LOSS_PERCENT: i64 = 90;

    /// Bonus per player beyond the first, capped
    pub const TEAM_BONUS_PERCENT_PER_PLAYER: i64 = 5;
    pub const TEAM_BONUS_PERCENT_CAP: i64 = 20;

    /// Fixed-point resolution for relevance weights
    pub const WEIGHT_SCALE: f64 = 1_000_000.0;
}
