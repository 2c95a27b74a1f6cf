use async_trait::async_trait;

use crate::error::EmbeddingResult;

/// Trait for embedding generation backends
///
/// Implementations return one vector per input, in input order. They do not
/// retry; rate limits and transport failures surface as
/// [`EmbeddingError::Backend`](crate::error::EmbeddingError::Backend).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &'static str;

    /// Width of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in batch
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}
