use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{
    match_data::{merge, MatchData},
    models::MatchResultModel,
    normalizer::{MatchIdGenerator, PayloadNormalizer, UuidMatchIdGenerator},
    repository::{InMemoryMatchResultRepository, MatchResultRepository},
    types::IngestResponse,
    upsert::{MatchUpsertResolver, UpsertState},
};
use crate::{
    config::IngestConfig,
    game_session::{
        repository::{GameSessionRepository, InMemoryGameSessionRepository},
        GameSessionModel, LinkContext, LinkOutcome, SessionLinker,
    },
    rewards::{
        repository::{
            InMemoryRewardSink, InMemorySkillRepository, InMemorySubjectRepository,
            InMemorySubjectSkillMappingRepository, RewardSink, SkillRepository,
            SubjectRepository, SubjectSkillMappingRepository,
        },
        RewardEvent, SkillRewardEngine,
    },
    shared::AppError,
    summary::{
        extract_player_summaries,
        repository::{InMemoryPlayerSummaryRepository, PlayerSummaryRepository},
        MatchPlayerSummaryModel, PlayerSummary,
    },
};

/// Everything one ingest produced. Only the upsert is guaranteed; the
/// enrichment fields are best effort.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub match_result: MatchResultModel,
    pub state: UpsertState,
    pub session: Option<GameSessionModel>,
    pub summaries: Vec<PlayerSummary>,
    pub rewards: Vec<RewardEvent>,
}

impl IngestOutcome {
    pub fn to_response(&self) -> IngestResponse {
        IngestResponse {
            success: true,
            match_id: self.match_result.match_id.clone(),
            session_id: self
                .session
                .as_ref()
                .map(|session| session.session_id.to_string()),
        }
    }
}

/// Ingests match submissions: stores the result idempotently, then links it to
/// its game session, records player summaries and emits skill rewards.
pub struct MatchIngestService {
    normalizer: PayloadNormalizer,
    linker: SessionLinker,
    upsert: MatchUpsertResolver,
    summaries: Arc<dyn PlayerSummaryRepository + Send + Sync>,
    rewards: SkillRewardEngine,
}

impl MatchIngestService {
    pub fn builder(config: IngestConfig) -> MatchIngestServiceBuilder {
        MatchIngestServiceBuilder::new(config)
    }

    /// Runs the full pipeline for one raw submission. Fails only when the match
    /// result itself could not be stored.
    #[instrument(skip_all)]
    pub async fn ingest(&self, raw: &Value) -> Result<IngestOutcome, AppError> {
        let command = self.normalizer.normalize(raw, Utc::now());
        info!(match_id = %command.match_id, result = %command.result, "Ingesting match result");

        let ctx = LinkContext::from_command(&command);
        let candidate = self.linker.find_candidate(&ctx).await;

        let match_data = match candidate.as_ref().and_then(question_pack_of) {
            Some(pack) => merge(&command.match_data, &MatchData::with_question_pack(pack)),
            None => command.match_data.clone(),
        };

        let outcome = self.upsert.upsert(&command, &match_data).await.map_err(|err| {
            error!(match_id = %command.match_id, error = %err, "Failed to store match result");
            err
        })?;

        if !outcome.is_persisted() {
            warn!(match_id = %command.match_id, "Match result not persisted, skipping enrichment");
            return Ok(IngestOutcome {
                match_result: outcome.match_result,
                state: outcome.state,
                session: None,
                summaries: Vec::new(),
                rewards: Vec::new(),
            });
        }

        let match_result = outcome.match_result;
        let stored_data = MatchData::from_json_str(&match_result.match_data_json);
        let link_ctx = ctx
            .with_match_data(&stored_data)
            .with_prior_candidate(candidate);
        let session = self.link_session(&link_ctx, &match_result).await;

        let summaries = extract_player_summaries(
            raw,
            session.as_ref().and_then(|session| session.user_id),
        );
        self.replace_summaries(&match_result, session.as_ref(), &summaries)
            .await;

        let rewards = match self
            .rewards
            .award(&match_result, session.as_ref(), &summaries)
            .await
        {
            Ok(rewards) => rewards,
            Err(err) => {
                error!(match_result_id = match_result.id, error = %err, "Failed to award skill rewards");
                Vec::new()
            }
        };

        info!(
            match_result_id = match_result.id,
            state = %outcome.state,
            linked = session.is_some(),
            summaries = summaries.len(),
            rewards = rewards.len(),
            "Match result ingested"
        );

        Ok(IngestOutcome {
            match_result,
            state: outcome.state,
            session,
            summaries,
            rewards,
        })
    }

    async fn link_session(
        &self,
        ctx: &LinkContext,
        match_result: &MatchResultModel,
    ) -> Option<GameSessionModel> {
        let session = self.linker.find_for_link(ctx).await?;

        match self.linker.link(session, match_result).await {
            Ok(LinkOutcome::Linked(session)) => Some(session),
            Ok(LinkOutcome::Conflict { session_id, linked_to }) => {
                warn!(%session_id, linked_to, match_result_id = match_result.id, "Session belongs to another match result, not linked");
                None
            }
            Err(err) => {
                error!(match_result_id = match_result.id, error = %err, "Failed to link session");
                None
            }
        }
    }

    /// The newest extraction replaces whatever was stored for the match before
    async fn replace_summaries(
        &self,
        match_result: &MatchResultModel,
        session: Option<&GameSessionModel>,
        summaries: &[PlayerSummary],
    ) {
        let session_id = session.map(|session| session.session_id);
        let rows: Vec<MatchPlayerSummaryModel> = summaries
            .iter()
            .map(|summary| MatchPlayerSummaryModel::from_summary(match_result.id, session_id, summary))
            .collect();

        if let Err(err) = self.summaries.delete_by_match_result_id(match_result.id).await {
            error!(match_result_id = match_result.id, error = %err, "Failed to clear player summaries");
            return;
        }
        if let Err(err) = self.summaries.add_range(&rows).await {
            error!(match_result_id = match_result.id, error = %err, "Failed to store player summaries");
            return;
        }
        debug!(match_result_id = match_result.id, count = rows.len(), "Player summaries replaced");
    }
}

fn question_pack_of(session: &GameSessionModel) -> Option<Value> {
    let text = session.question_pack_json.as_deref()?;
    match serde_json::from_str::<Value>(text) {
        Ok(pack) if pack.is_object() => Some(pack),
        Ok(_) => None,
        Err(err) => {
            debug!(session_id = %session.session_id, error = %err, "Ignoring unreadable question pack");
            None
        }
    }
}

/// Wires a `MatchIngestService`; any store left unset falls back to its
/// in-memory implementation
pub struct MatchIngestServiceBuilder {
    config: IngestConfig,
    id_generator: Option<Arc<dyn MatchIdGenerator>>,
    match_results: Option<Arc<dyn MatchResultRepository + Send + Sync>>,
    sessions: Option<Arc<dyn GameSessionRepository + Send + Sync>>,
    summaries: Option<Arc<dyn PlayerSummaryRepository + Send + Sync>>,
    subjects: Option<Arc<dyn SubjectRepository + Send + Sync>>,
    subject_skill_mappings: Option<Arc<dyn SubjectSkillMappingRepository + Send + Sync>>,
    skills: Option<Arc<dyn SkillRepository + Send + Sync>>,
    reward_sink: Option<Arc<dyn RewardSink + Send + Sync>>,
}

impl MatchIngestServiceBuilder {
    fn new(config: IngestConfig) -> Self {
        Self {
            config,
            id_generator: None,
            match_results: None,
            sessions: None,
            summaries: None,
            subjects: None,
            subject_skill_mappings: None,
            skills: None,
            reward_sink: None,
        }
    }

    pub fn id_generator(mut self, generator: Arc<dyn MatchIdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    pub fn match_results(mut self, repo: Arc<dyn MatchResultRepository + Send + Sync>) -> Self {
        self.match_results = Some(repo);
        self
    }

    pub fn sessions(mut self, repo: Arc<dyn GameSessionRepository + Send + Sync>) -> Self {
        self.sessions = Some(repo);
        self
    }

    pub fn summaries(mut self, repo: Arc<dyn PlayerSummaryRepository + Send + Sync>) -> Self {
        self.summaries = Some(repo);
        self
    }

    pub fn subjects(mut self, repo: Arc<dyn SubjectRepository + Send + Sync>) -> Self {
        self.subjects = Some(repo);
        self
    }

    pub fn subject_skill_mappings(
        mut self,
        repo: Arc<dyn SubjectSkillMappingRepository + Send + Sync>,
    ) -> Self {
        self.subject_skill_mappings = Some(repo);
        self
    }

    pub fn skills(mut self, repo: Arc<dyn SkillRepository + Send + Sync>) -> Self {
        self.skills = Some(repo);
        self
    }

    pub fn reward_sink(mut self, sink: Arc<dyn RewardSink + Send + Sync>) -> Self {
        self.reward_sink = Some(sink);
        self
    }

    pub fn build(self) -> MatchIngestService {
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemoryGameSessionRepository::new()));
        let match_results = self
            .match_results
            .unwrap_or_else(|| Arc::new(InMemoryMatchResultRepository::new()));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UuidMatchIdGenerator));

        MatchIngestService {
            normalizer: PayloadNormalizer::with_generator(
                id_generator,
                self.config.default_match_duration_minutes,
            ),
            linker: SessionLinker::new(sessions, &self.config),
            upsert: MatchUpsertResolver::new(match_results),
            summaries: self
                .summaries
                .unwrap_or_else(|| Arc::new(InMemoryPlayerSummaryRepository::new())),
            rewards: SkillRewardEngine::new(
                self.subjects
                    .unwrap_or_else(|| Arc::new(InMemorySubjectRepository::new())),
                self.subject_skill_mappings
                    .unwrap_or_else(|| Arc::new(InMemorySubjectSkillMappingRepository::new())),
                self.skills
                    .unwrap_or_else(|| Arc::new(InMemorySkillRepository::new())),
                self.reward_sink
                    .unwrap_or_else(|| Arc::new(InMemoryRewardSink::new())),
            ),
        }
    }
}
