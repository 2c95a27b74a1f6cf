use core_config::{AppInfo, FromEnv, app_info, env_parse_or, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_embeddings::EmbeddingConfig;

pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub database: PostgresConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
    pub environment: Environment,
    /// Apply pending migrations before serving (`DB_RUN_MIGRATIONS`).
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let database = PostgresConfig::from_env()?; // Required - will fail if not set
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let embedding = EmbeddingConfig::from_env()?;
        let run_migrations = env_parse_or("DB_RUN_MIGRATIONS", true)?;

        Ok(Self {
            app: app_info!(),
            database,
            embedding,
            server,
            environment,
            run_migrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_embeddings::EmbeddingBackend;

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/medchat")),
                ("EMBEDDING_MODE", Some("openai")),
                ("DB_RUN_MIGRATIONS", Some("false")),
                ("PORT", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.embedding.backend, EmbeddingBackend::OpenAi);
                assert_eq!(config.embedding.dimension(), 1536);
                assert!(!config.run_migrations);
                assert_eq!(config.server.port, 8080);
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_var_unset("DATABASE_URL", || {
            assert!(Config::from_env().is_err());
        });
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
