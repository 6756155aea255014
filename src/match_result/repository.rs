use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{MatchOutcome, MatchResultModel, NewMatchResult};
use crate::shared::AppError;

/// Result of attempting to insert a match result
#[derive(Debug, Clone, PartialEq)]
pub enum InsertMatchResult {
    /// Row stored, returns it with its assigned identity
    Inserted(MatchResultModel),
    /// Another row with the same external match id already exists
    AlreadyExists,
}

/// Trait for match result repository operations
#[async_trait]
pub trait MatchResultRepository {
    async fn get_by_external_id(&self, match_id: &str)
        -> Result<Option<MatchResultModel>, AppError>;

    /// Inserts a new row. A uniqueness conflict on `match_id` is reported as
    /// `InsertMatchResult::AlreadyExists`, never as an error.
    async fn add(&self, new_match: &NewMatchResult) -> Result<InsertMatchResult, AppError>;

    async fn update(&self, match_result: &MatchResultModel) -> Result<(), AppError>;
}

#[derive(Default)]
struct MatchResultTable {
    rows: HashMap<String, MatchResultModel>,
    next_id: i64,
}

/// In-memory implementation of MatchResultRepository for development and testing
pub struct InMemoryMatchResultRepository {
    table: Mutex<MatchResultTable>,
}

impl Default for InMemoryMatchResultRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMatchResultRepository {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(MatchResultTable::default()),
        }
    }

    /// Returns the current number of stored match results
    pub fn match_count(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }
}

#[async_trait]
impl MatchResultRepository for InMemoryMatchResultRepository {
    #[instrument(skip(self))]
    async fn get_by_external_id(
        &self,
        match_id: &str,
    ) -> Result<Option<MatchResultModel>, AppError> {
        let table = self.table.lock().unwrap();
        let found = table.rows.get(match_id).cloned();
        debug!(match_id = %match_id, found = found.is_some(), "Fetched match result from memory");
        Ok(found)
    }

    #[instrument(skip(self, new_match), fields(match_id = %new_match.match_id))]
    async fn add(&self, new_match: &NewMatchResult) -> Result<InsertMatchResult, AppError> {
        let mut table = self.table.lock().unwrap();
        if table.rows.contains_key(&new_match.match_id) {
            debug!("Match result already exists in memory");
            return Ok(InsertMatchResult::AlreadyExists);
        }

        table.next_id += 1;
        let row = new_match.with_id(table.next_id);
        table.rows.insert(row.match_id.clone(), row.clone());

        debug!(id = row.id, "Match result inserted in memory");
        Ok(InsertMatchResult::Inserted(row))
    }

    #[instrument(skip(self, match_result), fields(match_id = %match_result.match_id))]
    async fn update(&self, match_result: &MatchResultModel) -> Result<(), AppError> {
        let mut table = self.table.lock().unwrap();
        match table.rows.get_mut(&match_result.match_id) {
            Some(row) if row.id == match_result.id => {
                *row = match_result.clone();
                debug!("Match result updated in memory");
                Ok(())
            }
            _ => {
                warn!("Match result not found for update in memory");
                Err(AppError::NotFound("Match result not found".to_string()))
            }
        }
    }
}

/// PostgreSQL implementation of match result repository
pub struct PostgresMatchResultRepository {
    pool: PgPool,
}

impl PostgresMatchResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn match_result_from_row(row: &PgRow) -> MatchResultModel {
    let result: String = row.get("result");
    MatchResultModel {
        id: row.get("id"),
        match_id: row.get("match_id"),
        result: MatchOutcome::from_stored(&result),
        scene: row.get("scene"),
        start_utc: row.get("start_utc"),
        end_utc: row.get("end_utc"),
        total_players: row.get("total_players"),
        user_id: row.get("user_id"),
        match_data_json: row.get("match_data_json"),
    }
}

#[async_trait]
impl MatchResultRepository for PostgresMatchResultRepository {
    #[instrument(skip(self))]
    async fn get_by_external_id(
        &self,
        match_id: &str,
    ) -> Result<Option<MatchResultModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, match_id, result, scene, start_utc, end_utc, total_players, user_id, match_data_json FROM match_results WHERE match_id = $1"
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, match_id = %match_id, "Failed to fetch match result from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(match_result_from_row))
    }

    #[instrument(skip(self, new_match), fields(match_id = %new_match.match_id))]
    async fn add(&self, new_match: &NewMatchResult) -> Result<InsertMatchResult, AppError> {
        let inserted = sqlx::query(
            "INSERT INTO match_results (match_id, result, scene, start_utc, end_utc, total_players, user_id, match_data_json) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"
        )
        .bind(&new_match.match_id)
        .bind(new_match.result.as_ref())
        .bind(&new_match.scene)
        .bind(new_match.start_utc)
        .bind(new_match.end_utc)
        .bind(new_match.total_players)
        .bind(new_match.user_id)
        .bind(&new_match.match_data_json)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => {
                let id: i64 = row.get("id");
                debug!(id, "Match result inserted in database");
                Ok(InsertMatchResult::Inserted(new_match.with_id(id)))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!(constraint = ?db_err.constraint(), "Match result already exists in database");
                Ok(InsertMatchResult::AlreadyExists)
            }
            Err(e) => {
                warn!(error = %e, "Failed to insert match result");
                Err(AppError::DatabaseError(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, match_result), fields(match_id = %match_result.match_id))]
    async fn update(&self, match_result: &MatchResultModel) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE match_results SET result = $2, scene = $3, start_utc = $4, end_utc = $5, total_players = $6, user_id = $7, match_data_json = $8 WHERE id = $1"
        )
        .bind(match_result.id)
        .bind(match_result.result.as_ref())
        .bind(&match_result.scene)
        .bind(match_result.start_utc)
        .bind(match_result.end_utc)
        .bind(match_result.total_players)
        .bind(match_result.user_id)
        .bind(&match_result.match_data_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to update match result");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            warn!("Match result not found for update");
            return Err(AppError::NotFound("Match result not found".to_string()));
        }

        Ok(())
    }
}
