use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    errors::RewardError,
    models::{RewardEvent, SkillModel, SubjectModel, SubjectSkillMappingModel},
};
use crate::shared::AppError;

/// Read-only view of the subject catalogue
#[async_trait]
pub trait SubjectRepository {
    async fn get_by_code(&self, code: &str) -> Result<Option<SubjectModel>, AppError>;
}

#[async_trait]
pub trait SubjectSkillMappingRepository {
    async fn get_by_subject_ids(
        &self,
        subject_ids: &[Uuid],
    ) -> Result<Vec<SubjectSkillMappingModel>, AppError>;
}

#[async_trait]
pub trait SkillRepository {
    async fn get_all(&self) -> Result<Vec<SkillModel>, AppError>;
}

/// Outbound command sink of the XP ingestion collaborator
#[async_trait]
pub trait RewardSink {
    async fn submit(&self, event: &RewardEvent) -> Result<(), RewardError>;
}

/// In-memory subject catalogue for development and testing
#[derive(Default)]
pub struct InMemorySubjectRepository {
    subjects: Vec<SubjectModel>,
}

impl InMemorySubjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subjects(subjects: Vec<SubjectModel>) -> Self {
        Self { subjects }
    }
}

#[async_trait]
impl SubjectRepository for InMemorySubjectRepository {
    #[instrument(skip(self))]
    async fn get_by_code(&self, code: &str) -> Result<Option<SubjectModel>, AppError> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| subject.code.eq_ignore_ascii_case(code))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemorySubjectSkillMappingRepository {
    mappings: Vec<SubjectSkillMappingModel>,
}

impl InMemorySubjectSkillMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: Vec<SubjectSkillMappingModel>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl SubjectSkillMappingRepository for InMemorySubjectSkillMappingRepository {
    #[instrument(skip(self))]
    async fn get_by_subject_ids(
        &self,
        subject_ids: &[Uuid],
    ) -> Result<Vec<SubjectSkillMappingModel>, AppError> {
        Ok(self
            .mappings
            .iter()
            .filter(|mapping| subject_ids.contains(&mapping.subject_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySkillRepository {
    skills: Vec<SkillModel>,
}

impl InMemorySkillRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skills(skills: Vec<SkillModel>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl SkillRepository for InMemorySkillRepository {
    async fn get_all(&self) -> Result<Vec<SkillModel>, AppError> {
        Ok(self.skills.clone())
    }
}

/// Records every submitted reward, for tests and local development
#[derive(Default)]
pub struct InMemoryRewardSink {
    events: Mutex<Vec<RewardEvent>>,
}

impl InMemoryRewardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RewardEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewardSink for InMemoryRewardSink {
    async fn submit(&self, event: &RewardEvent) -> Result<(), RewardError> {
        debug!(user_id = %event.user_id, skill_id = %event.skill_id, points = event.points, "Recording reward in memory");
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink used when no XP service is wired up: rewards are only logged
pub struct LoggingRewardSink;

#[async_trait]
impl RewardSink for LoggingRewardSink {
    async fn submit(&self, event: &RewardEvent) -> Result<(), RewardError> {
        info!(
            user_id = %event.user_id,
            skill_id = %event.skill_id,
            points = event.points,
            source_type = %event.source_type,
            source_id = %event.source_id,
            reason = %event.reason,
            "Skill reward issued"
        );
        Ok(())
    }
}

/// Read-only PostgreSQL view of the subject and skill catalogue
pub struct PostgresSkillCatalogRepository {
    pool: PgPool,
}

impl PostgresSkillCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectRepository for PostgresSkillCatalogRepository {
    #[instrument(skip(self))]
    async fn get_by_code(&self, code: &str) -> Result<Option<SubjectModel>, AppError> {
        sqlx::query_as::<_, SubjectModel>(
            "SELECT id, code, name FROM subjects WHERE lower(code) = lower($1) LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to load subject");
            AppError::DatabaseError(e.to_string())
        })
    }
}

#[async_trait]
impl SubjectSkillMappingRepository for PostgresSkillCatalogRepository {
    #[instrument(skip(self))]
    async fn get_by_subject_ids(
        &self,
        subject_ids: &[Uuid],
    ) -> Result<Vec<SubjectSkillMappingModel>, AppError> {
        sqlx::query_as::<_, SubjectSkillMappingModel>(
            "SELECT subject_id, skill_id, relevance_weight FROM subject_skill_mappings WHERE subject_id = ANY($1) ORDER BY subject_id, skill_id",
        )
        .bind(subject_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to load subject skill mappings");
            AppError::DatabaseError(e.to_string())
        })
    }
}

#[async_trait]
impl SkillRepository for PostgresSkillCatalogRepository {
    async fn get_all(&self) -> Result<Vec<SkillModel>, AppError> {
        sqlx::query_as::<_, SkillModel>("SELECT id, name FROM skills")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to load skills");
                AppError::DatabaseError(e.to_string())
            })
    }
}
