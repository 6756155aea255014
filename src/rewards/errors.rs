use thiserror::Error;

use crate::shared::AppError;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Reward sink error: {0}")]
    Sink(String),
}

impl From<AppError> for RewardError {
    fn from(err: AppError) -> Self {
        RewardError::Repository(err.to_string())
    }
}
