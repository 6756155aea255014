use axum::{
    routing::{get, post},
    Router,
};
use match_ingest::{
    config::IngestConfig,
    game_session::PostgresGameSessionRepository,
    match_result::{ingest_match_result, MatchIngestService, PostgresMatchResultRepository},
    rewards::{LoggingRewardSink, PostgresSkillCatalogRepository},
    shared::AppState,
    summary::PostgresPlayerSummaryRepository,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "match_ingest=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting match ingest service");

    if let Err(err) = run(IngestConfig::from_env()).await {
        error!(error = %err, "Match ingest service stopped");
        std::process::exit(1);
    }
}

async fn run(config: IngestConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = MatchIngestService::builder(config.clone()).reward_sink(Arc::new(LoggingRewardSink));

    // Without a database everything runs against in-memory stores
    match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let catalog = Arc::new(PostgresSkillCatalogRepository::new(pool.clone()));
            builder = builder
                .match_results(Arc::new(PostgresMatchResultRepository::new(pool.clone())))
                .sessions(Arc::new(PostgresGameSessionRepository::new(pool.clone())))
                .summaries(Arc::new(PostgresPlayerSummaryRepository::new(pool)))
                .subjects(catalog.clone())
                .subject_skill_mappings(catalog.clone())
                .skills(catalog);
            info!("Using PostgreSQL stores");
        }
        None => warn!("DATABASE_URL not set, using in-memory stores"),
    }

    let app_state = AppState::new(Arc::new(builder.build()));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/match-results", post(ingest_match_result))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
