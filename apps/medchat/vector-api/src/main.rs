use axum_helpers::{close_postgres, create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_embeddings::{EmbeddingGenerator, EmbeddingService, PgEmbeddingRepository};
use std::time::Duration;
use tracing::info;

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

/// Oldest pgvector with iterative index scans.
const MIN_PGVECTOR: (u32, u32) = (0, 8);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;

    if config.run_migrations {
        database::postgres::run_migrations::<migration::Migrator>(&db, config.app.name)
            .await
            .map_err(|e| eyre::eyre!("Migrations failed: {}", e))?;
    }

    let pgvector = database::postgres::require_extension(&db, "vector", MIN_PGVECTOR)
        .await
        .map_err(|e| eyre::eyre!("pgvector check failed: {}", e))?;

    let generator = EmbeddingGenerator::from_config(&config.embedding)
        .map_err(|e| eyre::eyre!("Embedding backend unavailable: {}", e))?;
    info!(
        backend = %config.embedding.backend,
        model = generator.model_name(),
        dimension = generator.dimension(),
        pgvector = %pgvector,
        "Embedding generator ready"
    );

    let embeddings = EmbeddingService::new(PgEmbeddingRepository::new(db.clone()), generator);
    // A fresh database is installed at vector(384); adopt the configured width
    // while no vectors are stored.
    embeddings
        .prepare_schema()
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    let state = AppState {
        config,
        db,
        embeddings,
    };

    // Build router with API routes
    let api_routes = api::routes(&state);

    // create_router adds docs/middleware to our composed routes
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes).await?;

    // - /health: liveness check with app name/version
    // - /ready: database ping and embedding schema check
    let app = router
        .merge(health_router(state.config.app))
        .merge(api::ready_router(state.clone()));

    info!("Starting MedChat vector API with production-ready shutdown (30s timeout)");

    let server = state.config.server.clone();
    create_production_app(
        app,
        &server,
        Duration::from_secs(30), // 30s graceful shutdown timeout
        async move {
            info!("Shutting down: closing database connections");
            close_postgres(state.db, "medchat").await;
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("MedChat vector API shutdown complete");
    Ok(())
}
