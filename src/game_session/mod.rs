// Public API - what other modules can use
pub use linker::{LinkContext, LinkOutcome, SessionLinker, SessionStrategy};
pub use models::GameSessionModel;
pub use repository::{
    GameSessionRepository, InMemoryGameSessionRepository, PostgresGameSessionRepository,
};

// Internal modules
pub mod linker;
pub mod models;
pub mod repository;
