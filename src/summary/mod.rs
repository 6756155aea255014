// Public API - what other modules can use
pub use extractor::extract_player_summaries;
pub use models::{MatchPlayerSummaryModel, PlayerSummary};
pub use repository::{
    InMemoryPlayerSummaryRepository, PlayerSummaryRepository, PostgresPlayerSummaryRepository,
};

// Internal modules
pub mod extractor;
pub mod models;
pub mod repository;
