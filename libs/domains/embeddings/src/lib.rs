//! Embeddings Domain Library
//!
//! Semantic search over chat messages and patient memory, backed by pgvector.
//! Rows carry a nullable `"contentEmbedding"` column; vectors are written on
//! insert when possible and filled in later by the backfill otherwise.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   EmbeddingService   │  ← search, embed-on-write, backfill, stats, schema
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐     ┌──────────────────────┐
//! │ EmbeddingRepository  │     │ EmbeddingGenerator   │
//! │      (trait)         │     │  truncation, width   │
//! └──────────┬───────────┘     └──────────┬───────────┘
//!            │                            │
//! ┌──────────▼───────────┐     ┌──────────▼───────────┐
//! │ PgEmbeddingRepository│     │ EmbeddingProvider    │
//! │ InMemory (tests)     │     │ Local / OpenAI /     │
//! └──────────────────────┘     │ Hashing (tests)      │
//!                              └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use core_config::FromEnv;
//! use domain_embeddings::{
//!     EmbeddingConfig, EmbeddingGenerator, EmbeddingService, MessageSearch,
//!     PgEmbeddingRepository,
//! };
//!
//! # async fn example(db: sea_orm::DatabaseConnection) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EmbeddingConfig::from_env()?;
//! let generator = EmbeddingGenerator::from_config(&config)?;
//! let service = EmbeddingService::new(PgEmbeddingRepository::new(db), generator);
//!
//! service.verify_schema().await?;
//! let matches = service
//!     .search_messages("chest pain", MessageSearch::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod render;
pub mod repository;
pub mod service;
pub mod similarity;

pub use config::{EmbeddingBackend, EmbeddingConfig};
pub use embedding::{EmbeddingProvider, HashingProvider, OpenAIConfig, OpenAIProvider};
#[cfg(feature = "local-model")]
pub use embedding::LocalProvider;
pub use error::{EmbeddingError, EmbeddingResult};
pub use generator::EmbeddingGenerator;
pub use handlers::{ApiDoc, router};
pub use models::{
    BackfillOptions, BackfillProgress, BackfillReport, BackfillScope, BatchOutcome, Conversation,
    EmbeddingStats, EmbeddingTable, MemoryMatch, MemorySearch, Message, MessageMatch,
    MessageSearch, NewConversation, NewMessage, NewPatientMemory, PatientMemory, TableCoverage,
};
pub use postgres::PgEmbeddingRepository;
pub use render::{Embeddable, render_memory, render_message};
pub use repository::{EmbeddingRepository, InMemoryEmbeddingRepository};
pub use service::{EmbeddingService, resize_embeddings};
pub use similarity::{cosine_similarity, parse_vector_literal, vector_to_literal};
