//! Integration tests for the semantic cache
//!
//! These tests cover the full cache behavior:
//! - Threshold-gated similarity matching
//! - Best-match selection and tie handling
//! - TTL expiry
//! - Capacity cleanup at the configured limits
//! - Round-trip fidelity and persistence across reconnects
//! - Cacheability filtering
//! - Concurrent lookups while puts are in flight

use pizzaiolo_cache::{
    CacheConfig, Embedder, PutOutcome, RejectReason, Result, SemanticCache, SourceDocument,
};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic embedder for tests
///
/// Returns registered vectors for known texts and falls back to a unit
/// vector derived from the text hash, so distinct texts get stable distinct
/// embeddings without a model.
struct MockEmbedder {
    fixed: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    fn new() -> Self {
        Self {
            fixed: HashMap::new(),
        }
    }

    fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.fixed.get(text) {
            return Ok(vector.clone());
        }
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let angle = (hasher.finish() % 3_600) as f32 / 3_600.0 * std::f32::consts::PI;
        Ok(vec![angle.cos(), angle.sin()])
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Unit vector whose cosine similarity to [1, 0] is the given value
fn unit_at(cosine: f32) -> Vec<f32> {
    vec![cosine, (1.0 - cosine * cosine).sqrt()]
}

async fn connect_cache(config: CacheConfig, embedder: MockEmbedder) -> SemanticCache {
    SemanticCache::connect(config, Arc::new(embedder))
        .await
        .unwrap()
}

async fn raw_pool(path: &str) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path)).unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_similarity_exactly_at_threshold_is_a_hit() {
    // [3,4] vs [4,3]: dot 24, both norms exactly 5, similarity exactly 0.96
    let embedder = MockEmbedder::new()
        .with_vector("how good is the pizza here", vec![3.0, 4.0])
        .with_vector("is the pizza any good here", vec![4.0, 3.0]);
    let config = CacheConfig::builder()
        .db_path(":memory:")
        .wal_mode(false)
        .max_connections(1)
        .similarity_threshold(0.96)
        .build();
    let cache = connect_cache(config, embedder).await;

    cache
        .put("how good is the pizza here", "Very good", &[])
        .await
        .unwrap();

    let hit = cache
        .try_get("is the pizza any good here")
        .await
        .unwrap()
        .expect("similarity equal to the threshold must match");
    assert_eq!(hit.answer, "Very good");
    assert_eq!(hit.similarity, 0.96);
}

#[tokio::test]
async fn test_similarity_below_threshold_is_a_miss() {
    let embedder = MockEmbedder::new()
        .with_vector("how good is the pizza here", vec![3.0, 4.0])
        .with_vector("is the pizza any good here", vec![4.0, 3.0]);
    let config = CacheConfig::builder()
        .db_path(":memory:")
        .wal_mode(false)
        .max_connections(1)
        .similarity_threshold(0.97)
        .build();
    let cache = connect_cache(config, embedder).await;

    cache
        .put("how good is the pizza here", "Very good", &[])
        .await
        .unwrap();

    // 0.96 < 0.97: close is not enough
    assert!(cache
        .try_get("is the pizza any good here")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_best_match_wins_among_multiple_candidates() {
    let embedder = MockEmbedder::new()
        .with_vector("where to find crispy crust pizza", unit_at(0.93))
        .with_vector("best wood fired pizza in the city", unit_at(0.95))
        .with_vector("top rated pizza places open late", unit_at(0.96))
        .with_vector("good pizza spots around here", vec![1.0, 0.0]);
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    cache
        .put("where to find crispy crust pizza", "crispy answer", &[])
        .await
        .unwrap();
    cache
        .put("best wood fired pizza in the city", "wood fired answer", &[])
        .await
        .unwrap();
    cache
        .put("top rated pizza places open late", "top rated answer", &[])
        .await
        .unwrap();

    let hit = cache
        .try_get("good pizza spots around here")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.answer, "top rated answer");
    assert!(hit.similarity > 0.955 && hit.similarity < 0.965);
}

#[tokio::test]
async fn test_tied_scores_prefer_the_most_recent_entry() {
    let shared = vec![0.6, 0.8];
    let embedder = MockEmbedder::new()
        .with_vector("first stored pizza question here", shared.clone())
        .with_vector("second stored pizza question here", shared.clone())
        .with_vector("which pizza question matches this", shared.clone());
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    cache
        .put("first stored pizza question here", "first answer", &[])
        .await
        .unwrap();
    cache
        .put("second stored pizza question here", "second answer", &[])
        .await
        .unwrap();

    let hit = cache
        .try_get("which pizza question matches this")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.answer, "second answer");
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let embedder = MockEmbedder::new();
    let config = CacheConfig::builder()
        .db_path(":memory:")
        .wal_mode(false)
        .max_connections(1)
        .ttl(Duration::from_millis(100))
        .build();
    let cache = connect_cache(config, embedder).await;

    cache
        .put("how long does pizza keep", "three days, refrigerated", &[])
        .await
        .unwrap();

    assert!(cache
        .try_get("how long does pizza keep")
        .await
        .unwrap()
        .is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(cache
        .try_get("how long does pizza keep")
        .await
        .unwrap()
        .is_none());
    // expired entries stay visible in the admin listing until cleanup
    assert_eq!(cache.list_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_backdated_entry_is_not_matched() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.db").to_string_lossy().to_string();

    let embedder =
        MockEmbedder::new().with_vector("oldest pizza question on file", vec![0.6, 0.8]);
    let cache = connect_cache(CacheConfig::new(&db_path), embedder).await;

    cache
        .put("oldest pizza question on file", "ancient answer", &[])
        .await
        .unwrap();

    // push the entry eight days into the past, beyond the 7-day TTL
    let pool = raw_pool(&db_path).await;
    let eight_days_ms = 8 * 24 * 3600 * 1000_i64;
    sqlx::query("UPDATE cache_entries SET created_at = created_at - ?")
        .bind(eight_days_ms)
        .execute(&pool)
        .await
        .unwrap();

    assert!(cache
        .try_get("oldest pizza question on file")
        .await
        .unwrap()
        .is_none());
    assert_eq!(cache.list_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_capacity_cleanup_at_the_configured_limits() {
    // max 1000: the put that sees 800 entries compacts to 600, then inserts
    let embedder = MockEmbedder::new();
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    for i in 0..801 {
        let outcome = cache
            .put(
                &format!("pizza question number {} please", i),
                &format!("answer {}", i),
                &[],
            )
            .await
            .unwrap();
        assert!(matches!(outcome, PutOutcome::Stored { .. }));
    }

    let entries = cache.list_entries().await.unwrap();
    assert_eq!(entries.len(), 601);

    let questions: Vec<&str> = entries.iter().map(|e| e.question.as_str()).collect();
    // the 200 oldest are gone, everything from the 201st on survives
    assert!(!questions.contains(&"pizza question number 0 please"));
    assert!(!questions.contains(&"pizza question number 199 please"));
    assert!(questions.contains(&"pizza question number 200 please"));
    assert!(questions.contains(&"pizza question number 800 please"));

    // newest first
    assert_eq!(entries[0].question, "pizza question number 800 please");
}

#[tokio::test]
async fn test_round_trip_preserves_sources_exactly() {
    let embedder =
        MockEmbedder::new().with_vector("pizza sources fidelity check", vec![0.0, 1.0]);
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    let sources = vec![
        SourceDocument::new("Th\u{e9} best margherita I've had")
            .with_metadata("restaurant", json!("La Niña"))
            .with_metadata("rating", json!(4.8))
            .with_metadata("tags", json!(["wood-fired", "thin"])),
        SourceDocument::new("Second source, plain"),
        SourceDocument::new("Third, with nested metadata")
            .with_metadata("visit", json!({"year": 2025, "repeat": true})),
    ];

    cache
        .put("pizza sources fidelity check", "the answer", &sources)
        .await
        .unwrap();

    let hit = cache
        .try_get("pizza sources fidelity check")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.answer, "the answer");
    assert_eq!(hit.sources, sources);
    assert_eq!(hit.sources[0].content, "Th\u{e9} best margherita I've had");
}

#[tokio::test]
async fn test_entries_survive_a_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.db").to_string_lossy().to_string();

    {
        let embedder =
            MockEmbedder::new().with_vector("persistent pizza question here", vec![0.6, 0.8]);
        let cache = connect_cache(CacheConfig::new(&db_path), embedder).await;
        cache
            .put("persistent pizza question here", "durable answer", &[])
            .await
            .unwrap();
    }

    let embedder =
        MockEmbedder::new().with_vector("persistent pizza question here", vec![0.6, 0.8]);
    let cache = connect_cache(CacheConfig::new(&db_path), embedder).await;

    let hit = cache
        .try_get("persistent pizza question here")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.answer, "durable answer");
}

#[tokio::test]
async fn test_uncacheable_questions_are_rejected() {
    let embedder = MockEmbedder::new();
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    let too_short = cache.put("pizza near me", "a", &[]).await.unwrap();
    assert!(matches!(
        too_short,
        PutOutcome::Rejected(RejectReason::TooFewWords { words: 3 })
    ));

    let off_topic = cache
        .put("what is the capital of france", "Paris", &[])
        .await
        .unwrap();
    assert!(matches!(
        off_topic,
        PutOutcome::Rejected(RejectReason::NoCacheableKeyword)
    ));

    let too_specific = cache
        .put("track order #1234 for my pizza", "on its way", &[])
        .await
        .unwrap();
    assert!(matches!(
        too_specific,
        PutOutcome::Rejected(RejectReason::SpecificIndicator("order"))
    ));

    assert!(cache.list_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_hit_count_accumulates_per_match() {
    let embedder = MockEmbedder::new()
        .with_vector("favorite pizza topping combos", vec![0.6, 0.8])
        .with_vector("what pizza toppings go together", vec![0.6, 0.8]);
    let cache = connect_cache(CacheConfig::in_memory(), embedder).await;

    cache
        .put("favorite pizza topping combos", "mushroom and onion", &[])
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(cache
            .try_get("what pizza toppings go together")
            .await
            .unwrap()
            .is_some());
    }

    let entries = cache.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    // starts at 1 on insert, one more per hit
    assert_eq!(entries[0].hit_count, 4);
}

#[tokio::test]
async fn test_concurrent_lookups_while_puts_are_in_flight() {
    let embedder = MockEmbedder::new();
    let cache = Arc::new(connect_cache(CacheConfig::in_memory(), embedder).await);

    let mut lookups = Vec::new();
    for i in 0..16 {
        let cache = Arc::clone(&cache);
        lookups.push(tokio::spawn(async move {
            cache
                .try_get(&format!("concurrent pizza lookup number {}", i))
                .await
        }));
    }

    for i in 0..8 {
        cache
            .put(
                &format!("concurrent pizza insert number {} here", i),
                "an answer",
                &[],
            )
            .await
            .unwrap();
    }

    for handle in lookups {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(cache.list_entries().await.unwrap().len(), 8);
}
