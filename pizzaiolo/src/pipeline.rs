//! Question answering pipeline: cache first, then rewrite, retrieve, generate

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use pizzaiolo_cache::{
    CacheConfig, Embedder, PutOutcome, SemanticCache, SourceDocument,
};

use crate::embedding::EmbeddingGenerator;
use crate::llm::{
    LlmError, ModelProvider, OllamaProvider, TogetherProvider, DEFAULT_LOCAL_MODEL,
};
use crate::prompts;
use crate::reviews::{self, ReviewIndex, ScoredReview, RESULTS_K};

/// Cache database file inside the data directory
pub const CACHE_DB_FILE: &str = "cache.db";

/// Review index directory inside the data directory
pub const REVIEW_INDEX_DIR: &str = "review_index";

/// Review corpus file inside the data directory
pub const CORPUS_FILE: &str = "pizza_reviews.json";

/// A review as exposed to API clients and cached alongside answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSource {
    pub restaurant: String,
    pub city: String,
    pub rating: f64,
    pub date: String,
    pub review: String,
}

impl ReviewSource {
    fn from_hit(hit: &ScoredReview) -> Self {
        Self {
            restaurant: hit.review.restaurant.clone(),
            city: hit.review.city.clone(),
            rating: hit.review.rating,
            date: hit.review.date.clone(),
            review: hit.review.review.clone(),
        }
    }

    fn from_cached(doc: &SourceDocument) -> Self {
        let text = |key: &str| {
            doc.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("N/A")
                .to_string()
        };

        Self {
            restaurant: text("restaurant"),
            city: text("city"),
            rating: doc
                .metadata
                .get("rating")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            date: text("date"),
            review: doc.content.clone(),
        }
    }
}

fn cache_source(hit: &ScoredReview) -> SourceDocument {
    SourceDocument::new(hit.review.review.clone())
        .with_metadata("restaurant", json!(hit.review.restaurant))
        .with_metadata("city", json!(hit.review.city))
        .with_metadata("rating", json!(hit.review.rating))
        .with_metadata("date", json!(hit.review.date))
}

/// Outcome of answering one question
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    /// Generated (or cached) answer text
    pub answer: String,

    /// Reviews the answer was grounded on
    pub sources: Vec<ReviewSource>,

    /// Whether the answer came from the semantic cache
    pub cached: bool,

    /// Similarity of the matched cache entry, present on cache hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

/// The full question answering pipeline
///
/// A lookup that clears the similarity threshold short-circuits everything
/// below it; otherwise the question is rewritten for retrieval, reviews are
/// fetched from the vector index, the model generates an answer and the
/// result is offered to the cache.
pub struct QaPipeline {
    cache: SemanticCache,
    index: ReviewIndex,
    embedder: Arc<dyn Embedder>,
    local_provider: Arc<dyn ModelProvider>,
    cloud_provider: Option<Arc<dyn ModelProvider>>,
}

impl QaPipeline {
    pub fn new(
        cache: SemanticCache,
        index: ReviewIndex,
        embedder: Arc<dyn Embedder>,
        local_provider: Arc<dyn ModelProvider>,
        cloud_provider: Option<Arc<dyn ModelProvider>>,
    ) -> Self {
        Self {
            cache,
            index,
            embedder,
            local_provider,
            cloud_provider,
        }
    }

    /// The semantic cache behind the pipeline, for stats and admin listings
    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    /// Answer a pizza question, serving from the cache when possible
    pub async fn answer(&self, question: &str, use_cloud_llm: bool) -> Result<PipelineAnswer> {
        info!(question, "handling pizza question");

        if let Some(hit) = self.cache.try_get(question).await? {
            return Ok(PipelineAnswer {
                answer: hit.answer,
                sources: hit.sources.iter().map(ReviewSource::from_cached).collect(),
                cached: true,
                similarity: Some(hit.similarity),
            });
        }

        let provider: &dyn ModelProvider = if use_cloud_llm {
            match &self.cloud_provider {
                Some(provider) => provider.as_ref(),
                None => return Err(LlmError::MissingApiKey.into()),
            }
        } else {
            self.local_provider.as_ref()
        };
        debug!(provider = provider.name(), "selected model provider");

        let rewrite_output = provider.generate(&prompts::rewrite_prompt(question)).await?;
        let parsed = prompts::parse_rewrite_output(&rewrite_output);
        debug!(
            city = parsed.city.as_deref().unwrap_or("none"),
            rewritten = %parsed.rewritten,
            "rewrote question for retrieval"
        );

        // A model that ignored the output format leaves rewritten empty;
        // search with the raw question in that case.
        let query = if parsed.rewritten.is_empty() {
            question
        } else {
            parsed.rewritten.as_str()
        };

        let query_embedding = self.embedder.embed(query)?;
        let hits = self
            .index
            .search(query_embedding, parsed.city.as_deref(), RESULTS_K)
            .await?;

        let review_block = format_reviews(&hits);
        info!(reviews = hits.len(), "calling model to generate answer");
        let answer = provider
            .generate(&prompts::answer_prompt(&review_block, question))
            .await?;

        let cache_sources: Vec<SourceDocument> = hits.iter().map(cache_source).collect();
        match self.cache.put(question, &answer, &cache_sources).await {
            Ok(PutOutcome::Stored { id }) => debug!(id, "cached generated answer"),
            Ok(PutOutcome::Rejected(reason)) => debug!(%reason, "answer not cached"),
            Err(err) => warn!(%err, "failed to cache answer"),
        }

        Ok(PipelineAnswer {
            answer,
            sources: hits.iter().map(ReviewSource::from_hit).collect(),
            cached: false,
            similarity: None,
        })
    }
}

/// Format retrieved reviews for the answer prompt
fn format_reviews(hits: &[ScoredReview]) -> String {
    debug!(count = hits.len(), "formatting retrieved reviews");
    if hits.is_empty() {
        return "No relevant reviews found.".to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Review {}:\nRestaurant: {}\nCity: {}\nRating: {}\nDate: {}\nReview:\n{}",
                i + 1,
                hit.review.restaurant,
                hit.review.city,
                hit.review.rating,
                hit.review.date,
                hit.review.review
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Wire up the full pipeline from a data directory
///
/// Opens the cache database and review index under `data_dir`, loads the
/// embedding model, and builds the review index from the corpus file if the
/// index is still empty. The cloud provider is attached only when
/// `TOGETHER_API_KEY` is set.
pub async fn build_pipeline(data_dir: &Path, ollama_url: &str) -> Result<QaPipeline> {
    std::fs::create_dir_all(data_dir)?;

    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingGenerator::new()?);

    let config = CacheConfig::new(data_dir.join(CACHE_DB_FILE).to_string_lossy());
    let cache = SemanticCache::connect(config, embedder.clone()).await?;

    let index = ReviewIndex::new(data_dir.join(REVIEW_INDEX_DIR)).await?;
    if !index.is_populated().await? {
        let corpus_path = data_dir.join(CORPUS_FILE);
        if corpus_path.exists() {
            info!("review index is empty, building it from {:?}", corpus_path);
            let corpus = reviews::load_corpus(&corpus_path)?;
            reviews::build_index(&index, embedder.as_ref(), &corpus).await?;
        } else {
            warn!(
                "no review corpus at {:?}, answers will have no sources",
                corpus_path
            );
        }
    }

    let local_provider: Arc<dyn ModelProvider> =
        Arc::new(OllamaProvider::new(ollama_url, DEFAULT_LOCAL_MODEL));
    let cloud_provider = TogetherProvider::from_env()
        .ok()
        .map(|provider| Arc::new(provider) as Arc<dyn ModelProvider>);

    Ok(QaPipeline::new(
        cache,
        index,
        embedder,
        local_provider,
        cloud_provider,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviews::Review;

    fn hit(restaurant: &str, city: &str, rating: f64, text: &str) -> ScoredReview {
        ScoredReview {
            review: Review {
                restaurant: restaurant.to_string(),
                city: city.to_string(),
                state: "IL".to_string(),
                rating,
                date: "2024-01-15".to_string(),
                categories: "Pizza".to_string(),
                review: text.to_string(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_format_reviews_empty() {
        assert_eq!(format_reviews(&[]), "No relevant reviews found.");
    }

    #[test]
    fn test_format_reviews_numbering_and_fields() {
        let hits = vec![
            hit("Napoli Centro", "Tel Aviv", 4.5, "Thin crust, great sauce."),
            hit("Old City Slice", "Jerusalem", 4.0, "Generous toppings."),
        ];

        let block = format_reviews(&hits);
        assert!(block.starts_with("Review 1:\nRestaurant: Napoli Centro\nCity: Tel Aviv"));
        assert!(block.contains("Review 2:\nRestaurant: Old City Slice"));
        assert!(block.contains("Rating: 4.5"));
        assert!(block.contains("Review:\nThin crust, great sauce."));
    }

    #[test]
    fn test_review_source_round_trips_through_cache_document() {
        let original = hit("Napoli Centro", "Tel Aviv", 4.5, "Thin crust, great sauce.");

        let doc = cache_source(&original);
        assert_eq!(doc.content, "Thin crust, great sauce.");

        let restored = ReviewSource::from_cached(&doc);
        let direct = ReviewSource::from_hit(&original);
        assert_eq!(restored.restaurant, direct.restaurant);
        assert_eq!(restored.city, direct.city);
        assert_eq!(restored.rating, direct.rating);
        assert_eq!(restored.date, direct.date);
        assert_eq!(restored.review, direct.review);
    }

    #[test]
    fn test_review_source_defaults_for_missing_metadata() {
        let doc = SourceDocument::new("bare review text");
        let source = ReviewSource::from_cached(&doc);
        assert_eq!(source.restaurant, "N/A");
        assert_eq!(source.city, "N/A");
        assert_eq!(source.rating, 0.0);
        assert_eq!(source.review, "bare review text");
    }
}
