//! Semantic cache over the SQLite store
//!
//! [`SemanticCache`] ties the pieces together: the cacheability filter
//! decides what goes in, the embedder turns questions into vectors, the
//! store persists entries, and the metrics tracker records every lookup.
//!
//! Lookups match by meaning, not by text. A stored answer for "best pizza
//! in tel aviv" also answers "what is the best pizza place in tel aviv?"
//! as long as the two embeddings are similar enough.

use crate::config::CacheConfig;
use crate::embedder::Embedder;
use crate::entry::{CachedResponse, EntrySummary, SourceDocument};
use crate::error::{CacheError, Result};
use crate::filter::{self, RejectReason};
use crate::metrics::{CacheReport, MetricsTracker};
use crate::similarity::cosine_similarity;
use crate::store::CacheStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of a [`SemanticCache::put`]
#[derive(Debug)]
pub enum PutOutcome {
    /// Entry stored under the returned id
    Stored { id: i64 },

    /// Question failed the cacheability heuristics, nothing stored
    Rejected(RejectReason),
}

/// Embedding-based response cache with TTL expiry and capacity cleanup
pub struct SemanticCache {
    store: CacheStore,
    metrics: MetricsTracker,
    embedder: Arc<dyn Embedder>,
    config: CacheConfig,
    write_lock: Mutex<()>,
}

impl SemanticCache {
    /// Validate the configuration and open the backing store
    pub async fn connect(config: CacheConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let store = CacheStore::connect(&config).await?;
        let metrics = MetricsTracker::new(store.pool().clone());

        info!(
            db_path = %config.db_path,
            threshold = config.similarity_threshold,
            max_entries = config.max_entries,
            "semantic cache ready"
        );

        Ok(Self {
            store,
            metrics,
            embedder,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Look up a semantically equivalent cached answer
    ///
    /// Embeds the question, scans every live entry, and returns the single
    /// best match at or above the similarity threshold. The scan visits
    /// newest entries first and a later candidate must be strictly better to
    /// displace the current best, so among tied scores the most recently
    /// created entry wins.
    ///
    /// Every lookup records a metric event. A hit also bumps the matched
    /// entry's hit counter; if that update fails the hit is still returned.
    pub async fn try_get(&self, question: &str) -> Result<Option<CachedResponse>> {
        let started = Instant::now();

        let query_embedding = self.embedder.embed(question)?;
        if query_embedding.iter().all(|x| *x == 0.0) {
            return Err(CacheError::ZeroMagnitudeVector);
        }

        let entries = self.store.live_entries().await?;
        let candidates = entries.len();

        let mut best_index = None;
        let mut best_similarity = 0.0_f32;
        for (i, entry) in entries.iter().enumerate() {
            let similarity = match cosine_similarity(&query_embedding, &entry.embedding) {
                Ok(s) => s,
                Err(err) => {
                    warn!(id = entry.id, %err, "skipping entry during similarity scan");
                    continue;
                }
            };

            if similarity > best_similarity && similarity >= self.config.similarity_threshold {
                best_similarity = similarity;
                best_index = Some(i);
            }
        }

        if let Some(i) = best_index {
            let entry = &entries[i];

            if let Err(err) = self.store.increment_hit_count(entry.id).await {
                warn!(id = entry.id, %err, "failed to update hit count");
            }

            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            if let Err(err) = self
                .metrics
                .record(question, true, best_similarity, elapsed_ms)
                .await
            {
                warn!(%err, "failed to record cache hit");
            }

            info!(similarity = best_similarity, candidates, "cache hit");
            return Ok(Some(CachedResponse {
                answer: entry.answer.clone(),
                sources: entry.sources.clone(),
                similarity: best_similarity,
            }));
        }

        if let Err(err) = self.metrics.record(question, false, 0.0, 0.0).await {
            warn!(%err, "failed to record cache miss");
        }

        debug!(candidates, "cache miss");
        Ok(None)
    }

    /// Store a generated answer if the question passes the cacheability filter
    ///
    /// The write path is serialized: capacity enforcement and the insert
    /// never interleave across concurrent puts. Cleanup commits on its own
    /// before the question is embedded, so an embedding failure still leaves
    /// the store compacted.
    ///
    /// Puts never deduplicate; storing near-identical questions is allowed
    /// and lookups simply match whichever scores best.
    pub async fn put(
        &self,
        question: &str,
        answer: &str,
        sources: &[SourceDocument],
    ) -> Result<PutOutcome> {
        if let Some(reason) = filter::evaluate(question, self.config.min_query_words) {
            debug!(question, %reason, "not caching response");
            return Ok(PutOutcome::Rejected(reason));
        }

        let _guard = self.write_lock.lock().await;

        self.store.enforce_capacity().await?;

        let embedding = self.embedder.embed(question)?;
        let id = self
            .store
            .insert_entry(question, &embedding, answer, sources)
            .await?;

        info!(id, "response cached");
        Ok(PutOutcome::Stored { id })
    }

    /// Aggregate cache performance over the trailing window
    pub async fn stats(&self, window_hours: i64) -> Result<CacheReport> {
        self.metrics.report(window_hours).await
    }

    /// Summaries of all stored entries, newest first
    pub async fn list_entries(&self) -> Result<Vec<EntrySummary>> {
        self.store.list_entries().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    impl Embedder for FixedEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }
    }

    struct PanickingEmbedder;

    impl Embedder for PanickingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            panic!("embed must not be called for rejected puts");
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    async fn memory_cache(embedder: Arc<dyn Embedder>) -> SemanticCache {
        SemanticCache::connect(CacheConfig::in_memory(), embedder)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_hit_round_trip() {
        let embedder = Arc::new(FixedEmbedder {
            vector: vec![0.6, 0.8],
        });
        let cache = memory_cache(embedder).await;

        let sources = vec![SourceDocument::new("crispy and fast")
            .with_metadata("restaurant", json!("Napoli"))];
        let outcome = cache
            .put("best pizza in tel aviv", "Napoli, hands down", &sources)
            .await
            .unwrap();
        assert!(matches!(outcome, PutOutcome::Stored { .. }));

        let response = cache
            .try_get("what is the best pizza place in tel aviv?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.answer, "Napoli, hands down");
        assert_eq!(response.sources, sources);
        assert!((response.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rejected_put_never_embeds() {
        let cache = memory_cache(Arc::new(PanickingEmbedder)).await;

        let outcome = cache.put("pizza", "too short", &[]).await.unwrap();
        assert!(matches!(
            outcome,
            PutOutcome::Rejected(RejectReason::TooFewWords { words: 1 })
        ));
        assert!(cache.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_magnitude_query_is_an_error() {
        let cache = memory_cache(Arc::new(FixedEmbedder {
            vector: vec![0.0, 0.0],
        }))
        .await;

        let err = cache.try_get("any pizza question at all").await.unwrap_err();
        assert!(matches!(err, CacheError::ZeroMagnitudeVector));
    }

    #[tokio::test]
    async fn test_miss_on_empty_cache_records_metric() {
        let cache = memory_cache(Arc::new(FixedEmbedder {
            vector: vec![1.0, 0.0],
        }))
        .await;

        assert!(cache
            .try_get("any good pizza around here")
            .await
            .unwrap()
            .is_none());

        let report = cache.stats(24).await.unwrap();
        assert_eq!(report.total_queries, 1);
        assert_eq!(report.cache_misses, 1);
        assert_eq!(report.cache_hits, 0);
    }
}
