use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    models::{GameSessionModel, COMPLETED_STATUS},
    repository::GameSessionRepository,
};
use crate::{
    config::IngestConfig,
    match_result::{match_data::MatchData, models::MatchResultModel, normalizer::MatchCommand},
    shared::AppError,
};

type SessionStore = Arc<dyn GameSessionRepository + Send + Sync>;

/// Everything a strategy may use to find the session a match belongs to
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub match_id: String,
    pub join_code: Option<String>,
    pub user_id: Option<Uuid>,
    pub end_utc: DateTime<Utc>,
    /// `sessionId` echoed back in the merged match data
    pub embedded_session_id: Option<String>,
    /// Session found by the pre-persist pass, if any
    pub prior_candidate: Option<GameSessionModel>,
}

impl LinkContext {
    pub fn from_command(command: &MatchCommand) -> Self {
        Self {
            match_id: command.match_id.clone(),
            join_code: command.join_code.clone(),
            user_id: command.user_id,
            end_utc: command.end_utc,
            embedded_session_id: None,
            prior_candidate: None,
        }
    }

    pub fn with_match_data(mut self, match_data: &MatchData) -> Self {
        self.embedded_session_id = match_data.session_id.clone();
        self
    }

    pub fn with_prior_candidate(mut self, candidate: Option<GameSessionModel>) -> Self {
        self.prior_candidate = candidate;
        self
    }
}

/// One heuristic for resolving a match's session. Strategies are evaluated in
/// order and the first one that yields a session wins.
#[async_trait]
pub trait SessionStrategy: Send + Sync {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError>;

    fn strategy_name(&self) -> &'static str;
}

/// The match id is itself a session id
pub struct ExactMatchIdStrategy {
    sessions: SessionStore,
}

#[async_trait]
impl SessionStrategy for ExactMatchIdStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        match Uuid::parse_str(ctx.match_id.trim()) {
            Ok(session_id) => self.sessions.get_by_id(session_id).await,
            Err(_) => Ok(None),
        }
    }

    fn strategy_name(&self) -> &'static str {
        "exact_match_id"
    }
}

pub struct JoinCodeStrategy {
    sessions: SessionStore,
}

#[async_trait]
impl SessionStrategy for JoinCodeStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        match ctx.join_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => self.sessions.get_by_join_code(code).await,
            _ => Ok(None),
        }
    }

    fn strategy_name(&self) -> &'static str {
        "join_code"
    }
}

/// The owning user's session that ended closest to the match end
pub struct NearestUserSessionStrategy {
    sessions: SessionStore,
    limit: usize,
}

#[async_trait]
impl SessionStrategy for NearestUserSessionStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        let Some(user_id) = ctx.user_id else {
            return Ok(None);
        };
        let recent = self.sessions.get_recent_by_user(user_id, self.limit).await?;
        Ok(nearest_to(recent, ctx.end_utc, GameSessionModel::reference_time))
    }

    fn strategy_name(&self) -> &'static str {
        "nearest_user_session"
    }
}

/// A session id the client embedded in the match data
pub struct EmbeddedSessionIdStrategy {
    sessions: SessionStore,
}

#[async_trait]
impl SessionStrategy for EmbeddedSessionIdStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        match ctx
            .embedded_session_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id.trim()).ok())
        {
            Some(session_id) => self.sessions.get_by_id(session_id).await,
            None => Ok(None),
        }
    }

    fn strategy_name(&self) -> &'static str {
        "embedded_session_id"
    }
}

/// The globally recent, still unlinked session created closest to the match end
pub struct NearestUnlinkedSessionStrategy {
    sessions: SessionStore,
    limit: usize,
}

#[async_trait]
impl SessionStrategy for NearestUnlinkedSessionStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        let unlinked: Vec<GameSessionModel> = self
            .sessions
            .get_recent_global(self.limit)
            .await?
            .into_iter()
            .filter(|s| !s.is_linked())
            .collect();
        Ok(nearest_to(unlinked, ctx.end_utc, |s| s.created_at))
    }

    fn strategy_name(&self) -> &'static str {
        "nearest_unlinked_session"
    }
}

/// Whatever the pre-persist pass already found
pub struct PriorCandidateStrategy;

#[async_trait]
impl SessionStrategy for PriorCandidateStrategy {
    async fn resolve(&self, ctx: &LinkContext) -> Result<Option<GameSessionModel>, AppError> {
        Ok(ctx.prior_candidate.clone())
    }

    fn strategy_name(&self) -> &'static str {
        "prior_candidate"
    }
}

/// Picks the session whose instant is closest to `target`. Ties keep the
/// earlier entry.
pub fn nearest_to<F>(
    sessions: Vec<GameSessionModel>,
    target: DateTime<Utc>,
    instant: F,
) -> Option<GameSessionModel>
where
    F: Fn(&GameSessionModel) -> DateTime<Utc>,
{
    let mut best: Option<(f64, GameSessionModel)> = None;
    for session in sessions {
        let delta = minutes_between(instant(&session), target);
        match &best {
            Some((best_delta, _)) if delta >= *best_delta => {}
            _ => best = Some((delta, session)),
        }
    }
    best.map(|(_, session)| session)
}

fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (a - b).num_milliseconds().abs() as f64 / 60_000.0
}

/// Result of attaching a match result to a session
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Session now references the match result (newly or already)
    Linked(GameSessionModel),
    /// Session was already claimed by a different match result and was left untouched
    Conflict { session_id: Uuid, linked_to: i64 },
}

/// Resolves and links the game session a match result belongs to
pub struct SessionLinker {
    sessions: SessionStore,
    pre_persist: Vec<Arc<dyn SessionStrategy>>,
    post_persist: Vec<Arc<dyn SessionStrategy>>,
}

impl SessionLinker {
    pub fn new(sessions: SessionStore, config: &IngestConfig) -> Self {
        let exact: Arc<dyn SessionStrategy> = Arc::new(ExactMatchIdStrategy {
            sessions: sessions.clone(),
        });
        let join_code: Arc<dyn SessionStrategy> = Arc::new(JoinCodeStrategy {
            sessions: sessions.clone(),
        });
        let nearest_user: Arc<dyn SessionStrategy> = Arc::new(NearestUserSessionStrategy {
            sessions: sessions.clone(),
            limit: config.recent_user_session_limit,
        });

        let pre_persist = vec![exact.clone(), join_code.clone(), nearest_user.clone()];
        let post_persist: Vec<Arc<dyn SessionStrategy>> = vec![
            exact,
            join_code,
            nearest_user,
            Arc::new(EmbeddedSessionIdStrategy {
                sessions: sessions.clone(),
            }),
            Arc::new(NearestUnlinkedSessionStrategy {
                sessions: sessions.clone(),
                limit: config.recent_global_session_limit,
            }),
            Arc::new(PriorCandidateStrategy),
        ];

        Self::with_cascades(sessions, pre_persist, post_persist)
    }

    pub fn with_cascades(
        sessions: SessionStore,
        pre_persist: Vec<Arc<dyn SessionStrategy>>,
        post_persist: Vec<Arc<dyn SessionStrategy>>,
    ) -> Self {
        Self {
            sessions,
            pre_persist,
            post_persist,
        }
    }

    /// Candidate session before the match is stored (its question pack is folded into the match data)
    #[instrument(skip(self, ctx), fields(match_id = %ctx.match_id))]
    pub async fn find_candidate(&self, ctx: &LinkContext) -> Option<GameSessionModel> {
        run_cascade(&self.pre_persist, ctx).await
    }

    /// Session to attach the stored match to, using the broader heuristics
    #[instrument(skip(self, ctx), fields(match_id = %ctx.match_id))]
    pub async fn find_for_link(&self, ctx: &LinkContext) -> Option<GameSessionModel> {
        run_cascade(&self.post_persist, ctx).await
    }

    /// Marks the session completed and points it at the match result. A
    /// session linked to another match result is never re-pointed.
    #[instrument(skip(self, session, match_result), fields(session_id = %session.session_id, match_result_id = match_result.id))]
    pub async fn link(
        &self,
        session: GameSessionModel,
        match_result: &MatchResultModel,
    ) -> Result<LinkOutcome, AppError> {
        if let Some(linked_to) = session.match_result_id {
            if linked_to != match_result.id {
                warn!(linked_to, "Session already linked to another match result");
                return Ok(LinkOutcome::Conflict {
                    session_id: session.session_id,
                    linked_to,
                });
            }
        }

        let mut updated = session;
        updated.match_result_id = Some(match_result.id);
        updated.status = COMPLETED_STATUS.to_string();
        if updated.completed_at.is_none() {
            updated.completed_at = Some(Utc::now());
        }
        if updated.user_id.is_none() {
            updated.user_id = match_result.user_id;
        }

        self.sessions.update(&updated).await?;
        info!("Session linked to match result");
        Ok(LinkOutcome::Linked(updated))
    }
}

async fn run_cascade(
    strategies: &[Arc<dyn SessionStrategy>],
    ctx: &LinkContext,
) -> Option<GameSessionModel> {
    for strategy in strategies {
        match strategy.resolve(ctx).await {
            Ok(Some(session)) => {
                debug!(
                    strategy = strategy.strategy_name(),
                    session_id = %session.session_id,
                    "Session resolved"
                );
                return Some(session);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    strategy = strategy.strategy_name(),
                    error = %err,
                    "Session lookup failed, trying next strategy"
                );
            }
        }
    }
    debug!("No session resolved");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_session::repository::InMemoryGameSessionRepository;
    use crate::match_result::models::MatchOutcome;
    use chrono::{Duration, TimeZone};

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn session_created(minutes_from_end: i64) -> GameSessionModel {
        GameSessionModel::new(end() + Duration::minutes(minutes_from_end))
    }

    fn ctx(match_id: &str) -> LinkContext {
        LinkContext {
            match_id: match_id.to_string(),
            join_code: None,
            user_id: None,
            end_utc: end(),
            embedded_session_id: None,
            prior_candidate: None,
        }
    }

    fn linker(sessions: Vec<GameSessionModel>) -> (SessionLinker, Arc<InMemoryGameSessionRepository>) {
        let repo = Arc::new(InMemoryGameSessionRepository::with_sessions(sessions));
        (SessionLinker::new(repo.clone(), &IngestConfig::default()), repo)
    }

    fn match_result(id: i64, user_id: Option<Uuid>) -> MatchResultModel {
        MatchResultModel {
            id,
            match_id: format!("m-{id}"),
            result: MatchOutcome::Win,
            scene: "arena".to_string(),
            start_utc: end() - Duration::minutes(5),
            end_utc: end(),
            total_players: 1,
            user_id,
            match_data_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn exact_match_id_beats_join_code() {
        let by_id = session_created(-60);
        let mut by_code = session_created(0);
        by_code.join_code = Some("ROOM1".to_string());
        let (linker, _) = linker(vec![by_id.clone(), by_code]);

        let mut context = ctx(&by_id.session_id.to_string());
        context.join_code = Some("ROOM1".to_string());

        let found = linker.find_candidate(&context).await.unwrap();
        assert_eq!(found.session_id, by_id.session_id);
    }

    #[tokio::test]
    async fn join_code_is_trimmed() {
        let mut by_code = session_created(0);
        by_code.join_code = Some("ROOM1".to_string());
        let (linker, _) = linker(vec![by_code.clone()]);

        let mut context = ctx("not-a-session");
        context.join_code = Some("  ROOM1 ".to_string());

        let found = linker.find_candidate(&context).await.unwrap();
        assert_eq!(found.session_id, by_code.session_id);
    }

    #[tokio::test]
    async fn user_sessions_pick_closest_completion() {
        let user = Uuid::new_v4();
        let mut far = session_created(-120);
        far.user_id = Some(user);
        far.completed_at = Some(end() - Duration::minutes(90));
        let mut near = session_created(-30);
        near.user_id = Some(user);
        near.completed_at = Some(end() - Duration::minutes(1));
        let (linker, _) = linker(vec![far, near.clone()]);

        let mut context = ctx("m-1");
        context.user_id = Some(user);

        let found = linker.find_candidate(&context).await.unwrap();
        assert_eq!(found.session_id, near.session_id);
    }

    #[tokio::test]
    async fn pre_persist_pass_ignores_broad_heuristics() {
        let (linker, _) = linker(vec![session_created(-2)]);
        assert!(linker.find_candidate(&ctx("m-1")).await.is_none());
    }

    #[tokio::test]
    async fn post_persist_pass_uses_embedded_session_id() {
        let embedded = session_created(-500);
        let (linker, _) = linker(vec![embedded.clone(), session_created(0)]);

        let mut context = ctx("m-1");
        context.embedded_session_id = Some(embedded.session_id.to_string());

        let found = linker.find_for_link(&context).await.unwrap();
        assert_eq!(found.session_id, embedded.session_id);
    }

    #[tokio::test]
    async fn nearest_unlinked_session_wins_by_time_delta() {
        let three = session_created(-3);
        let seven = session_created(7);
        let mut linked = session_created(0);
        linked.match_result_id = Some(99);
        let (linker, _) = linker(vec![seven, three.clone(), linked]);

        let found = linker.find_for_link(&ctx("m-1")).await.unwrap();
        assert_eq!(found.session_id, three.session_id);
    }

    #[tokio::test]
    async fn falls_back_to_prior_candidate() {
        let prior = session_created(0);
        let cascade: Vec<Arc<dyn SessionStrategy>> = vec![Arc::new(PriorCandidateStrategy)];
        let linker = SessionLinker::with_cascades(
            Arc::new(InMemoryGameSessionRepository::new()),
            vec![],
            cascade,
        );

        let context = ctx("m-1").with_prior_candidate(Some(prior.clone()));
        assert_eq!(linker.find_for_link(&context).await, Some(prior));
    }

    #[test]
    fn exact_ties_keep_first_found() {
        let first = session_created(5);
        let second = session_created(-5);

        let found = nearest_to(vec![first.clone(), second], end(), |s| s.created_at).unwrap();
        assert_eq!(found.session_id, first.session_id);
    }

    #[tokio::test]
    async fn failing_strategy_does_not_stop_the_cascade() {
        struct Failing;

        #[async_trait]
        impl SessionStrategy for Failing {
            async fn resolve(
                &self,
                _ctx: &LinkContext,
            ) -> Result<Option<GameSessionModel>, AppError> {
                Err(AppError::DatabaseError("timeout".to_string()))
            }

            fn strategy_name(&self) -> &'static str {
                "failing"
            }
        }

        let prior = session_created(0);
        let linker = SessionLinker::with_cascades(
            Arc::new(InMemoryGameSessionRepository::new()),
            vec![Arc::new(Failing), Arc::new(PriorCandidateStrategy)],
            vec![],
        );

        let context = ctx("m-1").with_prior_candidate(Some(prior.clone()));
        assert_eq!(linker.find_candidate(&context).await, Some(prior));
    }

    #[tokio::test]
    async fn link_completes_session_and_backfills_user() {
        let user = Uuid::new_v4();
        let session = session_created(0);
        let (linker, repo) = linker(vec![session.clone()]);

        let outcome = linker
            .link(session.clone(), &match_result(7, Some(user)))
            .await
            .unwrap();

        assert!(matches!(outcome, LinkOutcome::Linked(_)));
        let stored = repo.snapshot(session.session_id).unwrap();
        assert_eq!(stored.match_result_id, Some(7));
        assert_eq!(stored.status, COMPLETED_STATUS);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.user_id, Some(user));
    }

    #[tokio::test]
    async fn link_keeps_existing_completion_and_owner() {
        let owner = Uuid::new_v4();
        let completed = end() - Duration::minutes(2);
        let mut session = session_created(-10);
        session.user_id = Some(owner);
        session.completed_at = Some(completed);
        let (linker, repo) = linker(vec![session.clone()]);

        linker
            .link(session.clone(), &match_result(7, Some(Uuid::new_v4())))
            .await
            .unwrap();

        let stored = repo.snapshot(session.session_id).unwrap();
        assert_eq!(stored.completed_at, Some(completed));
        assert_eq!(stored.user_id, Some(owner));
    }

    #[tokio::test]
    async fn link_never_repoints_a_claimed_session() {
        let mut session = session_created(0);
        session.match_result_id = Some(3);
        let (linker, repo) = linker(vec![session.clone()]);

        let outcome = linker.link(session.clone(), &match_result(8, None)).await.unwrap();

        assert_eq!(
            outcome,
            LinkOutcome::Conflict {
                session_id: session.session_id,
                linked_to: 3
            }
        );
        assert_eq!(repo.snapshot(session.session_id).unwrap().match_result_id, Some(3));
    }
}
