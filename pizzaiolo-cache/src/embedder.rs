//! Embedding provider abstraction
//!
//! The cache never talks to a model directly. Callers hand it anything that
//! implements [`Embedder`], so the same cache runs against a local fastembed
//! model in production and a deterministic stub in tests.

use crate::error::Result;

/// Produces fixed-dimension embedding vectors for natural-language text
pub trait Embedder: Send + Sync {
    /// Embed a single text into a vector with `dimension()` components
    ///
    /// Implementations should return [`crate::CacheError::EmbeddingUnavailable`]
    /// when the underlying model cannot be reached.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors this embedder produces
    fn dimension(&self) -> usize;
}
