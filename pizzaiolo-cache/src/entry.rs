//! Data types for cached question/answer records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One retrieved review record attached to a generated answer
///
/// Sources round-trip through storage exactly: the sequence order and every
/// metadata field come back as they were inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Free-text content of the source review
    pub content: String,

    /// Metadata fields (restaurant, city, rating, date, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SourceDocument {
    /// Create a source document with empty metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A fully materialized cache entry as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Monotonically increasing identifier, assigned on insert
    pub id: i64,

    /// Original user question, immutable
    pub question: String,

    /// Question embedding, produced once at insert time
    pub embedding: Vec<f32>,

    /// Generated response text
    pub answer: String,

    /// Ordered source documents the answer was grounded on
    pub sources: Vec<SourceDocument>,

    /// Insertion time; drives TTL expiry and age-based eviction order
    pub created_at: DateTime<Utc>,

    /// Number of lookups this entry has answered, starting at 1
    pub hit_count: i64,
}

/// What a successful lookup returns to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The stored answer text
    pub answer: String,

    /// The stored source documents, in original order
    pub sources: Vec<SourceDocument>,

    /// Cosine similarity between the incoming question and the matched entry
    pub similarity: f32,
}

/// Administrative listing row, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySummary {
    /// The cached question
    pub question: String,

    /// The cached answer
    pub answer: String,

    /// When the entry was inserted
    pub created_at: DateTime<Utc>,

    /// How many lookups it has answered
    pub hit_count: i64,
}
