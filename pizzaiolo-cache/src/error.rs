//! Error types for cache operations
//!
//! This module defines custom error types for the pizzaiolo-cache library.
//! The surrounding pipeline relies on being able to tell an embedding-provider
//! failure apart from a storage failure, so each gets its own variant.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Embedding provider failure - the text could not be turned into a vector
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Storage failure - locked table, disk error, pool exhaustion
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Serialization/Deserialization error for stored blobs
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A stored row could not be decoded back into a cache entry
    #[error("Malformed cache entry: {0}")]
    MalformedEntry(String),

    /// Cosine similarity is undefined when either vector has zero magnitude
    #[error("Cosine similarity undefined for a zero-magnitude vector")]
    ZeroMagnitudeVector,

    /// Embedding vectors of different dimensionality cannot be compared
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::EmbeddingUnavailable("model not loaded".to_string());
        assert_eq!(
            error.to_string(),
            "Embedding provider unavailable: model not loaded"
        );

        let mismatch = CacheError::DimensionMismatch {
            expected: 384,
            actual: 512,
        };
        assert!(mismatch.to_string().contains("expected 384"));
        assert!(mismatch.to_string().contains("got 512"));

        let zero = CacheError::ZeroMagnitudeVector;
        assert!(zero.to_string().contains("zero-magnitude"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let bad = serde_json::from_str::<Vec<String>>("not json");
        let error: CacheError = bad.unwrap_err().into();
        assert!(matches!(error, CacheError::SerializationError(_)));
    }
}
