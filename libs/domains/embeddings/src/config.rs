//! Embedding backend selection.
//!
//! The backend decides the model, the token budget and the vector width D.
//! D is carried here explicitly so the generator and the deployed schema can
//! be checked against each other at startup.

use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse_or};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};
use utoipa::ToSchema;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Rough characters-per-token ratio used to turn token budgets into character limits.
const CHARS_PER_TOKEN: usize = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 running in-process
    #[strum(serialize = "LOCAL")]
    Local,
    /// OpenAI text-embedding-3-small
    #[strum(serialize = "OPENAI")]
    OpenAi,
}

impl EmbeddingBackend {
    pub fn model_name(&self) -> &'static str {
        match self {
            EmbeddingBackend::Local => "all-MiniLM-L6-v2",
            EmbeddingBackend::OpenAi => "text-embedding-3-small",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingBackend::Local => 384,
            EmbeddingBackend::OpenAi => 1536,
        }
    }

    pub fn max_tokens(&self) -> usize {
        match self {
            EmbeddingBackend::Local => 512,
            EmbeddingBackend::OpenAi => 8191,
        }
    }

    /// Character budget; longer inputs are truncated before embedding.
    pub fn max_chars(&self) -> usize {
        self.max_tokens() * CHARS_PER_TOKEN
    }
}

#[derive(Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Only needed for [`EmbeddingBackend::OpenAi`]; checked per call.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Request-level timeout around remote embedding calls.
    pub timeout: Duration,
    /// Model cache directory for the local backend.
    pub cache_dir: Option<PathBuf>,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("backend", &self.backend)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("timeout", &self.timeout)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl EmbeddingConfig {
    pub fn new(backend: EmbeddingBackend) -> Self {
        Self {
            backend,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_dir: None,
        }
    }

    pub fn with_openai_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.openai_api_key = Some(api_key.into());
        self
    }

    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub fn model_name(&self) -> &'static str {
        self.backend.model_name()
    }

    pub fn max_chars(&self) -> usize {
        self.backend.max_chars()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::new(EmbeddingBackend::Local)
    }
}

impl FromEnv for EmbeddingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = env_parse_or("EMBEDDING_MODE", EmbeddingBackend::Local)?;
        let timeout_secs = env_parse_or("EMBEDDING_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            backend,
            openai_api_key: env_optional("OPENAI_API_KEY"),
            openai_base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs),
            cache_dir: env_optional("EMBEDDING_CACHE_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_constants() {
        assert_eq!(EmbeddingBackend::Local.dimension(), 384);
        assert_eq!(EmbeddingBackend::OpenAi.dimension(), 1536);
        assert_eq!(EmbeddingBackend::Local.max_chars(), 2048);
        assert_eq!(EmbeddingBackend::OpenAi.max_chars(), 32_764);
        assert_eq!(EmbeddingBackend::OpenAi.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_backend_parse_is_case_insensitive() {
        assert_eq!("openai".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::OpenAi);
        assert_eq!("Local".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::Local);
        assert!("cohere".parse::<EmbeddingBackend>().is_err());
        assert_eq!(EmbeddingBackend::OpenAi.to_string(), "OPENAI");
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                ("EMBEDDING_MODE", None::<&str>),
                ("OPENAI_API_KEY", None),
                ("OPENAI_BASE_URL", None),
                ("EMBEDDING_TIMEOUT_SECS", None),
                ("EMBEDDING_CACHE_DIR", None),
            ],
            || {
                let config = EmbeddingConfig::from_env().unwrap();
                assert_eq!(config.backend, EmbeddingBackend::Local);
                assert_eq!(config.dimension(), 384);
                assert!(config.openai_api_key.is_none());
                assert_eq!(config.openai_base_url, DEFAULT_OPENAI_BASE_URL);
                assert_eq!(config.timeout, Duration::from_secs(30));
                assert!(config.cache_dir.is_none());
            },
        );
    }

    #[test]
    fn test_from_env_openai() {
        temp_env::with_vars(
            [
                ("EMBEDDING_MODE", Some("openai")),
                ("OPENAI_API_KEY", Some("sk-test")),
                ("OPENAI_BASE_URL", Some("http://localhost:9999/v1/")),
                ("EMBEDDING_TIMEOUT_SECS", Some("5")),
            ],
            || {
                let config = EmbeddingConfig::from_env().unwrap();
                assert_eq!(config.backend, EmbeddingBackend::OpenAi);
                assert_eq!(config.dimension(), 1536);
                assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
                assert_eq!(config.openai_base_url, "http://localhost:9999/v1");
                assert_eq!(config.timeout, Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn test_from_env_missing_key_is_not_an_error() {
        temp_env::with_vars(
            [("EMBEDDING_MODE", Some("OPENAI")), ("OPENAI_API_KEY", Some("  "))],
            || {
                let config = EmbeddingConfig::from_env().unwrap();
                assert!(config.openai_api_key.is_none());
            },
        );
    }

    #[test]
    fn test_from_env_rejects_unknown_mode() {
        temp_env::with_var("EMBEDDING_MODE", Some("vertex"), || {
            let err = EmbeddingConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "EMBEDDING_MODE"));
        });
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = EmbeddingConfig::new(EmbeddingBackend::OpenAi).with_openai_api_key("sk-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
