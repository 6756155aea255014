// Public API - what other modules can use
pub use handlers::ingest_match_result;
pub use match_data::MatchData;
pub use models::{MatchOutcome, MatchResultModel, NewMatchResult};
pub use repository::{
    InMemoryMatchResultRepository, InsertMatchResult, MatchResultRepository,
    PostgresMatchResultRepository,
};
pub use service::{IngestOutcome, MatchIngestService, MatchIngestServiceBuilder};
pub use types::IngestResponse;
pub use upsert::{UpsertOutcome, UpsertState};

// Internal modules
mod handlers;
pub mod match_data;
pub mod models;
pub mod normalizer;
pub mod repository;
pub mod service;
mod types;
pub mod upsert;
