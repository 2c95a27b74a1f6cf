use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, provider_from_config};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::render::Embeddable;

/// Turns text into vectors of exactly `dimension` floats.
///
/// Stateless apart from the provider handle. Inputs longer than the
/// backend's character budget are truncated; blank inputs are rejected by
/// [`embed`](Self::embed) and dropped by [`embed_batch`](Self::embed_batch).
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    max_chars: usize,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("model", &self.provider.model_name())
            .field("dimension", &self.dimension)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

impl EmbeddingGenerator {
    /// Pairs `provider` with the limits of `config`.
    ///
    /// Fails when the provider's width differs from the configured D.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let dimension = config.dimension();
        if provider.dimension() != dimension {
            return Err(EmbeddingError::Config(format!(
                "{} produces {}-dimensional vectors but EMBEDDING_MODE={} expects {}",
                provider.model_name(),
                provider.dimension(),
                config.backend,
                dimension
            )));
        }

        Ok(Self {
            provider,
            dimension,
            max_chars: config.max_chars(),
        })
    }

    /// Builds the provider selected by `config` and wraps it.
    pub fn from_config(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        Self::new(provider_from_config(config)?, config)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &'static str {
        self.provider.model_name()
    }

    pub async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput("Text to embed must not be empty".to_string()));
        }

        let vector = self.provider.embed(truncate_chars(text, self.max_chars)).await?;
        self.check(&vector)?;
        Ok(vector)
    }

    /// Embeds the non-blank entries of `texts`, in order.
    ///
    /// Blank entries are dropped, so the output only lines up with the input
    /// when the caller filtered beforehand.
    pub async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| truncate_chars(t, self.max_chars).to_string())
            .collect();

        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let vectors = self.provider.embed_batch(&inputs).await?;
        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::Backend(format!(
                "{} returned {} embeddings for {} inputs",
                self.provider.model_name(),
                vectors.len(),
                inputs.len()
            )));
        }

        for vector in &vectors {
            self.check(vector)?;
        }
        Ok(vectors)
    }

    /// Embeds the canonical rendering of `record`.
    pub async fn embed_record<E: Embeddable + ?Sized>(&self, record: &E) -> EmbeddingResult<Vec<f32>> {
        self.embed(&record.render()).await
    }

    fn check(&self, vector: &[f32]) -> EmbeddingResult<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Backend(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.model_name(),
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Backend(format!(
                "{} returned a non-finite embedding",
                self.provider.model_name()
            )));
        }
        Ok(())
    }
}

/// Longest prefix of at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
