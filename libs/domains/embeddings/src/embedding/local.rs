use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::EmbeddingProvider;
use crate::config::EmbeddingBackend;
use crate::error::{EmbeddingError, EmbeddingResult};

/// all-MiniLM-L6-v2 through ONNX runtime, 384 dimensions.
///
/// The model is loaded on the first embedding call, so a missing download
/// fails that call instead of process startup. `TextEmbedding::embed` takes
/// `&mut self`, so the model sits behind a mutex and both loading and
/// inference run on the blocking pool.
pub struct LocalProvider {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    cache_dir: Option<PathBuf>,
}

impl LocalProvider {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            cache_dir,
        }
    }

    fn load(cache_dir: Option<PathBuf>) -> EmbeddingResult<TextEmbedding> {
        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::Backend(format!("Failed to load local embedding model: {}", e))
        })?;
        tracing::info!(model = EmbeddingBackend::Local.model_name(), "Local embedding model loaded");
        Ok(model)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &'static str {
        EmbeddingBackend::Local.model_name()
    }

    fn dimension(&self) -> usize {
        EmbeddingBackend::Local.dimension()
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Backend("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = Arc::clone(&self.model);
        let cache_dir = self.cache_dir.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut slot = model
                .lock()
                .map_err(|_| EmbeddingError::Internal("local embedding model lock poisoned".to_string()))?;
            if slot.is_none() {
                *slot = Some(Self::load(cache_dir)?);
            }
            let Some(model) = slot.as_mut() else {
                return Err(EmbeddingError::Internal("local embedding model not loaded".to_string()));
            };
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Internal(format!("Embedding task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_defers_model_load() {
        let provider = LocalProvider::new(Some(PathBuf::from("/nonexistent/fastembed-cache")));
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");
        assert!(provider.model.lock().unwrap().is_none());
    }
}
