//! Database connectivity for the MedChat services.
//!
//! PostgreSQL through sea-orm: pooled connections configured from the
//! environment, startup retry with backoff, migration running, health checks
//! and extension version checks (pgvector).
//!
//! # Features
//!
//! - `postgres` (default) - sea-orm connector
//! - `config` - `core_config::FromEnv` for [`postgres::PostgresConfig`]
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::postgres::{self, PostgresConfig};
//!
//! let db = postgres::connect_from_config_with_retry(PostgresConfig::from_env()?, None).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "vector-api").await?;
//! postgres::require_extension(&db, "vector", (0, 8)).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult};
