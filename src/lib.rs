// Library crate for the match ingest service
// This file exposes the public API for integration tests

pub mod config;
pub mod game_session;
pub mod json_fields;
pub mod match_result;
pub mod rewards;
pub mod shared;
pub mod summary;

// Re-export commonly used types for easier access in tests
pub use config::IngestConfig;
pub use match_result::{
    ingest_match_result, IngestOutcome, IngestResponse, MatchIngestService, UpsertState,
};
pub use shared::{AppError, AppState};
