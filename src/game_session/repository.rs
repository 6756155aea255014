use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::GameSessionModel;
use crate::shared::AppError;

const SESSION_COLUMNS: &str = "session_id, join_code, subject, question_pack_json, status, match_result_id, user_id, created_at, completed_at";

/// Trait for game session repository operations
#[async_trait]
pub trait GameSessionRepository {
    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<GameSessionModel>, AppError>;
    async fn get_by_join_code(&self, join_code: &str)
        -> Result<Option<GameSessionModel>, AppError>;

    /// The user's sessions, newest first, at most `limit`
    async fn get_recent_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<GameSessionModel>, AppError>;

    /// All sessions, newest first, at most `limit`
    async fn get_recent_global(&self, limit: usize) -> Result<Vec<GameSessionModel>, AppError>;

    async fn update(&self, session: &GameSessionModel) -> Result<(), AppError>;
}

/// In-memory implementation of GameSessionRepository for development and testing
pub struct InMemoryGameSessionRepository {
    sessions: Mutex<HashMap<Uuid, GameSessionModel>>,
}

impl Default for InMemoryGameSessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGameSessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-populated sessions
    pub fn with_sessions(sessions: Vec<GameSessionModel>) -> Self {
        let session_map = sessions
            .into_iter()
            .map(|session| (session.session_id, session))
            .collect();

        Self {
            sessions: Mutex::new(session_map),
        }
    }

    /// Reads a session synchronously (useful for assertions)
    pub fn snapshot(&self, session_id: Uuid) -> Option<GameSessionModel> {
        self.sessions.lock().unwrap().get(&session_id).cloned()
    }

    fn newest_first<F>(&self, limit: usize, predicate: F) -> Vec<GameSessionModel>
    where
        F: Fn(&GameSessionModel) -> bool,
    {
        let sessions = self.sessions.lock().unwrap();
        let mut matching: Vec<GameSessionModel> =
            sessions.values().filter(|s| predicate(s)).cloned().collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        matching.truncate(limit);
        matching
    }
}

#[async_trait]
impl GameSessionRepository for InMemoryGameSessionRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<GameSessionModel>, AppError> {
        let session = self.sessions.lock().unwrap().get(&session_id).cloned();
        debug!(found = session.is_some(), "Fetched game session from memory");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> Result<Option<GameSessionModel>, AppError> {
        // Join codes are only unique-ish; the newest session wins
        let session = self
            .newest_first(1, |s| s.join_code.as_deref() == Some(join_code))
            .into_iter()
            .next();
        debug!(found = session.is_some(), "Fetched game session by join code from memory");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn get_recent_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<GameSessionModel>, AppError> {
        Ok(self.newest_first(limit, |s| s.user_id == Some(user_id)))
    }

    #[instrument(skip(self))]
    async fn get_recent_global(&self, limit: usize) -> Result<Vec<GameSessionModel>, AppError> {
        Ok(self.newest_first(limit, |_| true))
    }

    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    async fn update(&self, session: &GameSessionModel) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.session_id) {
            warn!("Game session not found for update in memory");
            return Err(AppError::NotFound("Game session not found".to_string()));
        }
        sessions.insert(session.session_id, session.clone());
        debug!("Game session updated in memory");
        Ok(())
    }
}

/// PostgreSQL implementation of game session repository
pub struct PostgresGameSessionRepository {
    pool: PgPool,
}

impl PostgresGameSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    warn!(error = %e, "Game session query failed");
    AppError::DatabaseError(e.to_string())
}

#[async_trait]
impl GameSessionRepository for PostgresGameSessionRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<GameSessionModel>, AppError> {
        sqlx::query_as::<_, GameSessionModel>(&format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    #[instrument(skip(self))]
    async fn get_by_join_code(
        &self,
        join_code: &str,
    ) -> Result<Option<GameSessionModel>, AppError> {
        sqlx::query_as::<_, GameSessionModel>(&format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE join_code = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(join_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    #[instrument(skip(self))]
    async fn get_recent_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<GameSessionModel>, AppError> {
        sqlx::query_as::<_, GameSessionModel>(&format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    #[instrument(skip(self))]
    async fn get_recent_global(&self, limit: usize) -> Result<Vec<GameSessionModel>, AppError> {
        sqlx::query_as::<_, GameSessionModel>(&format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    async fn update(&self, session: &GameSessionModel) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE game_sessions SET status = $2, match_result_id = $3, user_id = $4, completed_at = $5 WHERE session_id = $1"
        )
        .bind(session.session_id)
        .bind(&session.status)
        .bind(session.match_result_id)
        .bind(session.user_id)
        .bind(session.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            warn!("Game session not found for update");
            return Err(AppError::NotFound("Game session not found".to_string()));
        }

        Ok(())
    }
}
