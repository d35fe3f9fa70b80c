//! Cosine similarity over embedding vectors

use crate::error::{CacheError, Result};

/// Compute cosine similarity between two vectors
///
/// Both vectors must have the same dimension and a non-zero magnitude;
/// similarity is undefined otherwise and an error is returned rather than a
/// silent 0.0 that a threshold comparison would misread as "dissimilar".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(CacheError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(CacheError::ZeroMagnitudeVector);
    }

    Ok(dot_product / (norm_a * norm_b))
}
