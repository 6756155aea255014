use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use match_ingest::{
    game_session::{GameSessionModel, GameSessionRepository, InMemoryGameSessionRepository},
    match_result::{InsertMatchResult, MatchResultModel, MatchResultRepository, NewMatchResult},
    rewards::{RewardError, RewardEvent, RewardSink},
    shared::AppError,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Session store whose selected operations fail, delegating the rest
pub struct FlakySessionRepository {
    inner: Arc<InMemoryGameSessionRepository>,
    fail_join_code: bool,
    fail_update: bool,
}

impl FlakySessionRepository {
    pub fn new(inner: Arc<InMemoryGameSessionRepository>) -> Self {
        Self {
            inner,
            fail_join_code: false,
            fail_update: false,
        }
    }

    pub fn failing_join_code(mut self) -> Self {
        self.fail_join_code = true;
        self
    }

    pub fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }
}

#[async_trait]
impl GameSessionRepository for FlakySessionRepository {
    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<GameSessionModel>, AppError> {
        self.inner.get_by_id(session_id).await
    }

    async fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> Result<Option<GameSessionModel>, AppError> {
        if self.fail_join_code {
            return Err(AppError::DatabaseError("join code lookup timed out".to_string()));
        }
        self.inner.get_by_join_code(join_code).await
    }

    async fn get_recent_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<GameSessionModel>, AppError> {
        self.inner.get_recent_by_user(user_id, limit).await
    }

    async fn get_recent_global(&self, limit: usize) -> Result<Vec<GameSessionModel>, AppError> {
        self.inner.get_recent_global(limit).await
    }

    async fn update(&self, session: &GameSessionModel) -> Result<(), AppError> {
        if self.fail_update {
            return Err(AppError::DatabaseError("session update rejected".to_string()));
        }
        self.inner.update(session).await
    }
}

/// Match store that reports every insert as a duplicate yet never finds the row
#[derive(Default)]
pub struct AlwaysConflictingMatchStore {
    pub inserts: Mutex<u32>,
}

#[async_trait]
impl MatchResultRepository for AlwaysConflictingMatchStore {
    async fn get_by_external_id(
        &self,
        _match_id: &str,
    ) -> Result<Option<MatchResultModel>, AppError> {
        Ok(None)
    }

    async fn add(&self, _new_match: &NewMatchResult) -> Result<InsertMatchResult, AppError> {
        *self.inserts.lock().unwrap() += 1;
        Ok(InsertMatchResult::AlreadyExists)
    }

    async fn update(&self, _match_result: &MatchResultModel) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct FailingRewardSink;

#[async_trait]
impl RewardSink for FailingRewardSink {
    async fn submit(&self, _event: &RewardEvent) -> Result<(), RewardError> {
        Err(RewardError::Sink("xp service unavailable".to_string()))
    }
}
