//! Embedding generation for cache lookups and review search

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use pizzaiolo_cache::{CacheError, Embedder};

/// Embedding dimension of the BGE-small English model
pub const EMBEDDING_DIM: usize = 384;

/// Sentence embedding model shared by the semantic cache and the review index
///
/// One instance per process; model weights are downloaded on first use and
/// cached locally by fastembed.
pub struct EmbeddingGenerator {
    model: TextEmbedding,
    dimension: usize,
}

impl EmbeddingGenerator {
    /// Create a new embedding generator with the BGE-small English model
    pub fn new() -> Result<Self> {
        info!("Initializing embedding model");

        let mut options = InitOptions::default();
        options.model_name = EmbeddingModel::BGESmallENV15;
        options.show_download_progress = true;

        let model = TextEmbedding::try_new(options)
            .context("Failed to initialize embedding model")?;

        Ok(Self {
            model,
            dimension: EMBEDDING_DIM,
        })
    }
}

impl Embedder for EmbeddingGenerator {
    fn embed(&self, text: &str) -> pizzaiolo_cache::Result<Vec<f32>> {
        let embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| CacheError::EmbeddingUnavailable(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::EmbeddingUnavailable("no embedding generated".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
