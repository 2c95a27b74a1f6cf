mod hashing;
#[cfg(feature = "local-model")]
mod local;
mod openai;
mod provider;

pub use hashing::HashingProvider;
#[cfg(feature = "local-model")]
pub use local::LocalProvider;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::EmbeddingProvider;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::EmbeddingResult;

/// Builds the provider selected by `config.backend`.
///
/// A missing OpenAI key is not an error here; each call fails instead.
pub fn provider_from_config(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    match config.backend {
        EmbeddingBackend::OpenAi => Ok(Arc::new(OpenAIProvider::new(OpenAIConfig::from(config))?)),
        EmbeddingBackend::Local => local_provider(config),
    }
}

#[cfg(feature = "local-model")]
fn local_provider(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(LocalProvider::new(config.cache_dir.clone())))
}

#[cfg(not(feature = "local-model"))]
fn local_provider(_config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    Err(crate::error::EmbeddingError::Config(
        "EMBEDDING_MODE=LOCAL requires building with the `local-model` feature".to_string(),
    ))
}
