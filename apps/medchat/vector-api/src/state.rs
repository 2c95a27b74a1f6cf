//! Application state management.
//!
//! The state is cloned into each handler (Arc clones only) and holds:
//! - Configuration
//! - The PostgreSQL pool
//! - The embedding service shared by the vector routes

use domain_embeddings::{EmbeddingService, PgEmbeddingRepository};
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    /// PostgreSQL database connection pool
    pub db: DatabaseConnection,
    /// Search, backfill and coverage over the pgvector columns
    pub embeddings: EmbeddingService<PgEmbeddingRepository>,
}
