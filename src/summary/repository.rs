use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::MatchPlayerSummaryModel;
use crate::shared::AppError;

/// Trait for player summary repository operations
#[async_trait]
pub trait PlayerSummaryRepository {
    async fn delete_by_match_result_id(&self, match_result_id: i64) -> Result<u64, AppError>;
    async fn add_range(&self, summaries: &[MatchPlayerSummaryModel]) -> Result<(), AppError>;
}

/// In-memory implementation of PlayerSummaryRepository for development and testing
pub struct InMemoryPlayerSummaryRepository {
    rows: Mutex<Vec<MatchPlayerSummaryModel>>,
}

impl Default for InMemoryPlayerSummaryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlayerSummaryRepository {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    /// All stored summaries for a match result, in insertion order
    pub fn for_match(&self, match_result_id: i64) -> Vec<MatchPlayerSummaryModel> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.match_result_id == match_result_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PlayerSummaryRepository for InMemoryPlayerSummaryRepository {
    #[instrument(skip(self))]
    async fn delete_by_match_result_id(&self, match_result_id: i64) -> Result<u64, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.match_result_id != match_result_id);
        let removed = (before - rows.len()) as u64;
        debug!(removed, "Player summaries deleted from memory");
        Ok(removed)
    }

    #[instrument(skip(self, summaries), fields(count = summaries.len()))]
    async fn add_range(&self, summaries: &[MatchPlayerSummaryModel]) -> Result<(), AppError> {
        self.rows.lock().unwrap().extend_from_slice(summaries);
        debug!("Player summaries added in memory");
        Ok(())
    }
}

/// PostgreSQL implementation of player summary repository
pub struct PostgresPlayerSummaryRepository {
    pool: PgPool,
}

impl PostgresPlayerSummaryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerSummaryRepository for PostgresPlayerSummaryRepository {
    #[instrument(skip(self))]
    async fn delete_by_match_result_id(&self, match_result_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM match_player_summaries WHERE match_result_id = $1")
            .bind(match_result_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to delete player summaries");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, summaries), fields(count = summaries.len()))]
    async fn add_range(&self, summaries: &[MatchPlayerSummaryModel]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to open transaction for player summaries");
            AppError::DatabaseError(e.to_string())
        })?;

        for summary in summaries {
            sqlx::query(
                "INSERT INTO match_player_summaries (match_result_id, session_id, user_id, client_id, total_questions, correct_answers, average_time, topic_breakdown_json) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            )
            .bind(summary.match_result_id)
            .bind(summary.session_id)
            .bind(summary.user_id)
            .bind(summary.client_id)
            .bind(summary.total_questions)
            .bind(summary.correct_answers)
            .bind(summary.average_time)
            .bind(&summary.topic_breakdown_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to insert player summary");
                AppError::DatabaseError(e.to_string())
            })?;
        }

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit player summaries");
            AppError::DatabaseError(e.to_string())
        })
    }
}
