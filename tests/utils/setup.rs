use axum::{routing::post, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use match_ingest::{
    config::IngestConfig,
    game_session::{GameSessionModel, GameSessionRepository, InMemoryGameSessionRepository},
    match_result::{
        ingest_match_result, InMemoryMatchResultRepository, MatchIngestService,
        MatchResultRepository,
    },
    rewards::{
        InMemoryRewardSink, InMemorySkillRepository, InMemorySubjectRepository,
        InMemorySubjectSkillMappingRepository, RewardSink, SkillModel, SubjectModel,
        SubjectSkillMappingModel,
    },
    shared::AppState,
    summary::InMemoryPlayerSummaryRepository,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub app: Router,
    pub service: Arc<MatchIngestService>,
    pub matches: Arc<InMemoryMatchResultRepository>,
    pub sessions: Arc<InMemoryGameSessionRepository>,
    pub summaries: Arc<InMemoryPlayerSummaryRepository>,
    pub rewards: Arc<InMemoryRewardSink>,
    pub skills: Vec<SkillModel>,
}

pub struct TestSetupBuilder {
    sessions: Vec<GameSessionModel>,
    subject_code: String,
    skill_weights: Vec<f64>,
    session_store: Option<Arc<dyn GameSessionRepository + Send + Sync>>,
    match_store: Option<Arc<dyn MatchResultRepository + Send + Sync>>,
    reward_sink: Option<Arc<dyn RewardSink + Send + Sync>>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            sessions: vec![],
            subject_code: "MATH".to_string(),
            skill_weights: vec![1.0],
            session_store: None,
            match_store: None,
            reward_sink: None,
        }
    }

    pub fn with_session(mut self, session: GameSessionModel) -> Self {
        self.sessions.push(session);
        self
    }

    /// Weights of the skills mapped to the `MATH` subject, one skill per weight
    pub fn with_skill_weights(mut self, weights: Vec<f64>) -> Self {
        self.skill_weights = weights;
        self
    }

    /// Replaces the in-memory session store (seeded sessions are ignored)
    pub fn with_session_store(mut self, store: Arc<dyn GameSessionRepository + Send + Sync>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_match_store(mut self, store: Arc<dyn MatchResultRepository + Send + Sync>) -> Self {
        self.match_store = Some(store);
        self
    }

    pub fn with_reward_sink(mut self, sink: Arc<dyn RewardSink + Send + Sync>) -> Self {
        self.reward_sink = Some(sink);
        self
    }

    pub fn build(self) -> TestSetup {
        let subject = SubjectModel {
            id: Uuid::new_v4(),
            code: self.subject_code.clone(),
            name: "Mathematics".to_string(),
        };
        let skills: Vec<SkillModel> = self
            .skill_weights
            .iter()
            .enumerate()
            .map(|(i, _)| SkillModel {
                id: Uuid::new_v4(),
                name: format!("skill-{i}"),
            })
            .collect();
        let mappings = skills
            .iter()
            .zip(&self.skill_weights)
            .map(|(skill, weight)| SubjectSkillMappingModel {
                subject_id: subject.id,
                skill_id: skill.id,
                relevance_weight: *weight,
            })
            .collect();

        let matches = Arc::new(InMemoryMatchResultRepository::new());
        let sessions = Arc::new(InMemoryGameSessionRepository::with_sessions(self.sessions));
        let summaries = Arc::new(InMemoryPlayerSummaryRepository::new());
        let rewards = Arc::new(InMemoryRewardSink::new());

        let service = MatchIngestService::builder(IngestConfig::default())
            .match_results(self.match_store.unwrap_or_else(|| matches.clone()))
            .sessions(self.session_store.unwrap_or_else(|| sessions.clone()))
            .summaries(summaries.clone())
            .subjects(Arc::new(InMemorySubjectRepository::with_subjects(vec![subject])))
            .subject_skill_mappings(Arc::new(InMemorySubjectSkillMappingRepository::with_mappings(
                mappings,
            )))
            .skills(Arc::new(InMemorySkillRepository::with_skills(skills.clone())))
            .reward_sink(self.reward_sink.unwrap_or_else(|| rewards.clone()))
            .build();
        let service = Arc::new(service);

        let app = Router::new()
            .route("/match-results", post(ingest_match_result))
            .with_state(AppState::new(service.clone()));

        TestSetup {
            app,
            service,
            matches,
            sessions,
            summaries,
            rewards,
            skills,
        }
    }
}

/// A session for the `MATH` subject, created at `created_at`
pub fn session(created_at: DateTime<Utc>) -> GameSessionModel {
    let mut session = GameSessionModel::new(created_at);
    session.subject = Some("MATH".to_string());
    session
}
