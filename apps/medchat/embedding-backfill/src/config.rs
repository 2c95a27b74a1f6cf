//! Configuration for the embedding backfill CLI

use core_config::{Environment, FromEnv, env_parse_or};
use database::postgres::PostgresConfig;
use domain_embeddings::EmbeddingConfig;
use domain_embeddings::models::DEFAULT_BACKFILL_DELAY;
use eyre::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub database: PostgresConfig,
    pub embedding: EmbeddingConfig,
    /// Pause between batches unless `--delay-ms` overrides it.
    pub delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_delay_ms = DEFAULT_BACKFILL_DELAY.as_millis() as u64;

        Ok(Self {
            environment: Environment::from_env(),
            database: PostgresConfig::from_env()?,
            embedding: EmbeddingConfig::from_env()?,
            delay: Duration::from_millis(env_parse_or("BACKFILL_DELAY_MS", default_delay_ms)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_defaults_to_half_a_second() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/medchat")),
                ("BACKFILL_DELAY_MS", None),
                ("EMBEDDING_MODE", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.delay, Duration::from_millis(500));
                assert_eq!(config.embedding.dimension(), 384);
            },
        );
    }

    #[test]
    fn test_delay_override() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/medchat")),
                ("BACKFILL_DELAY_MS", Some("0")),
            ],
            || {
                assert_eq!(Config::from_env().unwrap().delay, Duration::ZERO);
            },
        );
    }

    #[test]
    fn test_invalid_delay_is_an_error() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/medchat")),
                ("BACKFILL_DELAY_MS", Some("soon")),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_default_embedding_mode_builds_a_generator() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/medchat")),
                ("EMBEDDING_MODE", None),
                ("OPENAI_API_KEY", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                let generator = domain_embeddings::EmbeddingGenerator::from_config(&config.embedding).unwrap();
                assert_eq!(generator.dimension(), 384);
                assert_eq!(generator.model_name(), "all-MiniLM-L6-v2");
            },
        );
    }
}
