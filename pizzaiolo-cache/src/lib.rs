//! # Pizzaiolo Cache (pizzaiolo-cache)
//!
//! A persistent semantic response cache for the pizzaiolo QA service.
//!
//! Answering a pizza question means embedding the query, searching reviews,
//! and calling a language model. Users keep asking the same things in
//! different words, so this crate caches answers by meaning: a lookup
//! embeds the incoming question and returns the stored answer whose
//! embedding is most similar, provided it clears the similarity threshold.
//!
//! ## Features
//!
//! - Embedding-based matching with a tunable similarity threshold
//! - SQLite persistence in WAL mode, entries and metrics in one file
//! - TTL expiry plus two-phase capacity cleanup (expired first, then oldest)
//! - Cacheability heuristics that keep one-off questions out
//! - Per-lookup metrics with windowed performance reports
//!
//! ## Caching a response
//!
//! ```no_run
//! use pizzaiolo_cache::{CacheConfig, Embedder, Result, SemanticCache};
//! use std::sync::Arc;
//!
//! struct ToyEmbedder;
//!
//! impl Embedder for ToyEmbedder {
//!     fn embed(&self, text: &str) -> Result<Vec<f32>> {
//!         // stand-in for a real sentence-embedding model
//!         let mut v = vec![0.0f32; 8];
//!         for (i, b) in text.bytes().enumerate() {
//!             v[i % 8] += b as f32;
//!         }
//!         Ok(v)
//!     }
//!
//!     fn dimension(&self) -> usize {
//!         8
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = SemanticCache::connect(
//!         CacheConfig::new("pizza_cache.db"),
//!         Arc::new(ToyEmbedder),
//!     )
//!     .await?;
//!
//!     if let Some(hit) = cache.try_get("best pizza in tel aviv").await? {
//!         println!("cached: {} (similarity {:.3})", hit.answer, hit.similarity);
//!     } else {
//!         // ... generate the answer, then store it for the next asker
//!         cache
//!             .put("best pizza in tel aviv", "Napoli, hands down", &[])
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Inspecting cache performance
//!
//! ```no_run
//! # use pizzaiolo_cache::{CacheConfig, Embedder, Result, SemanticCache};
//! # use std::sync::Arc;
//! # struct ToyEmbedder;
//! # impl Embedder for ToyEmbedder {
//! #     fn embed(&self, _text: &str) -> Result<Vec<f32>> { Ok(vec![1.0, 0.0]) }
//! #     fn dimension(&self) -> usize { 2 }
//! # }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = SemanticCache::connect(
//!         CacheConfig::new("pizza_cache.db"),
//!         Arc::new(ToyEmbedder),
//!     )
//!     .await?;
//!
//!     let report = cache.stats(24).await?;
//!     println!("{}", report);
//!     for top in &report.top_queries {
//!         println!("- {:?} asked {} times", top.query, top.count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod embedder;
pub mod entry;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod similarity;
pub mod store;

// Re-export main types for convenience
pub use cache::{PutOutcome, SemanticCache};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use embedder::Embedder;
pub use entry::{CacheEntry, CachedResponse, EntrySummary, SourceDocument};
pub use error::{CacheError, Result};
pub use filter::{should_cache, RejectReason};
pub use metrics::{CacheReport, MetricsTracker, TopQuery};
pub use similarity::cosine_similarity;
pub use store::CacheStore;
