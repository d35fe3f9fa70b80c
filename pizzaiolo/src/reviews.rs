//! Review corpus loading and vector search over LanceDB

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pizzaiolo_cache::Embedder;

use crate::embedding::EMBEDDING_DIM;

/// Reviews returned per retrieval
pub const RESULTS_K: usize = 10;

/// One pizza review record from the corpus file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub restaurant: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub rating: f64,
    pub date: String,
    #[serde(default)]
    pub categories: String,
    pub review: String,
}

impl Review {
    /// Text that gets embedded and searched
    pub fn document_text(&self) -> String {
        format!("{} {}", self.restaurant, self.review)
    }
}

/// A review returned from the index with its similarity score
#[derive(Debug, Clone)]
pub struct ScoredReview {
    pub review: Review,
    pub score: f32,
}

/// Load the review corpus from a JSON array file
pub fn load_corpus(path: &Path) -> Result<Vec<Review>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read review corpus: {:?}", path))?;
    let reviews: Vec<Review> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse review corpus: {:?}", path))?;

    info!(count = reviews.len(), "loaded pizza reviews");
    Ok(reviews)
}

/// Vector index over pizza reviews using LanceDB
pub struct ReviewIndex {
    connection: Connection,
    table_name: String,
}

impl ReviewIndex {
    /// Open (or create) a review index at the given path
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Initializing review index at {:?}", db_path);

        let connection = lancedb::connect(db_path.to_string_lossy().as_ref())
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            connection,
            table_name: "reviews".to_string(),
        })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("city", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIM as i32,
                ),
                false,
            ),
        ]))
    }

    /// Get or create the reviews table
    async fn get_or_create_table(&self) -> Result<Table> {
        let table_names = self.connection.table_names().execute().await?;

        if table_names.contains(&self.table_name) {
            debug!("Opening existing table: {}", self.table_name);
            self.connection
                .open_table(&self.table_name)
                .execute()
                .await
                .context("Failed to open table")
        } else {
            info!("Creating new table: {}", self.table_name);
            let schema = Self::schema();
            let batch = RecordBatch::new_empty(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            self.connection
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .context("Failed to create table")
        }
    }

    /// Whether the table exists and holds at least one review
    pub async fn is_populated(&self) -> Result<bool> {
        let table_names = self.connection.table_names().execute().await?;
        if !table_names.contains(&self.table_name) {
            return Ok(false);
        }

        let table = self.connection.open_table(&self.table_name).execute().await?;
        Ok(table.count_rows(None).await? > 0)
    }

    /// Append reviews with their embeddings as one batch
    pub async fn add_reviews(
        &self,
        reviews: &[Review],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if reviews.len() != embeddings.len() {
            anyhow::bail!(
                "Review/embedding count mismatch: {} reviews, {} embeddings",
                reviews.len(),
                embeddings.len()
            );
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != EMBEDDING_DIM) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIM,
                bad.len()
            );
        }
        if reviews.is_empty() {
            return Ok(0);
        }

        let table = self.get_or_create_table().await?;
        let schema = Self::schema();

        let ids: Vec<String> = (0..reviews.len()).map(|i| format!("review-{:05}", i)).collect();
        let cities: Vec<&str> = reviews.iter().map(|r| r.city.as_str()).collect();
        let contents: Vec<String> = reviews.iter().map(|r| r.document_text()).collect();
        let metadata: Vec<String> = reviews
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;

        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            EMBEDDING_DIM as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )?;

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(cities)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(vector_array),
            ],
        )?;

        let row_count = batch.num_rows();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(batches)).execute().await?;

        info!(count = row_count, "indexed pizza reviews");
        Ok(row_count)
    }

    /// Search for reviews similar to the query embedding
    ///
    /// Distance is mapped to a 0..1 score as `1 / (1 + distance)` and results
    /// come back sorted by score descending. A city filters to exact matches
    /// on the review's city field.
    pub async fn search(
        &self,
        query_embedding: Vec<f32>,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredReview>> {
        if query_embedding.len() != EMBEDDING_DIM {
            anyhow::bail!(
                "Query embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIM,
                query_embedding.len()
            );
        }

        let table = self.get_or_create_table().await?;

        let mut query = table.vector_search(query_embedding)?.limit(limit);

        if let Some(city) = city {
            let city = city.trim().replace('\'', "''");
            debug!(%city, "filtering reviews by city");
            query = query.only_if(format!("city = '{}'", city));
        }

        let results = query.execute().await?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut scored = Vec::new();

        for batch in batches {
            let metadata_col = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distance_col = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            if let (Some(metadatas), Some(distances)) = (metadata_col, distance_col) {
                for i in 0..batch.num_rows() {
                    let review: Review = match serde_json::from_str(metadatas.value(i)) {
                        Ok(review) => review,
                        Err(err) => {
                            warn!(%err, "skipping review with unreadable metadata");
                            continue;
                        }
                    };

                    let distance = distances.value(i);
                    scored.push(ScoredReview {
                        review,
                        score: 1.0 / (1.0 + distance),
                    });
                }
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored)
    }

    /// Number of indexed reviews
    pub async fn count(&self) -> Result<usize> {
        let table = self.get_or_create_table().await?;
        Ok(table.count_rows(None).await?)
    }
}

/// Embed every review and add the batch to the index
pub async fn build_index(
    index: &ReviewIndex,
    embedder: &dyn Embedder,
    reviews: &[Review],
) -> Result<usize> {
    let mut embeddings = Vec::with_capacity(reviews.len());
    for review in reviews {
        embeddings.push(embedder.embed(&review.document_text())?);
    }
    index.add_reviews(reviews, embeddings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_reviews() -> Vec<Review> {
        vec![
            Review {
                restaurant: "Napoli Centro".to_string(),
                city: "Tel Aviv".to_string(),
                state: "IL".to_string(),
                rating: 4.5,
                date: "2024-03-01".to_string(),
                categories: "Pizza".to_string(),
                review: "Thin crust, blistered edges, perfect sauce.".to_string(),
            },
            Review {
                restaurant: "Old City Slice".to_string(),
                city: "Jerusalem".to_string(),
                state: "IL".to_string(),
                rating: 4.0,
                date: "2024-02-11".to_string(),
                categories: "Pizza".to_string(),
                review: "Generous toppings and quick service.".to_string(),
            },
        ]
    }

    fn one_hot(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_index_starts_empty() {
        let dir = tempdir().unwrap();
        let index = ReviewIndex::new(dir.path()).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(!index.is_populated().await.unwrap());
    }

    #[tokio::test]
    async fn test_add_and_search_reviews() {
        let dir = tempdir().unwrap();
        let index = ReviewIndex::new(dir.path()).await.unwrap();

        let reviews = sample_reviews();
        let added = index
            .add_reviews(&reviews, vec![one_hot(0), one_hot(1)])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert!(index.is_populated().await.unwrap());

        let hits = index.search(one_hot(0), None, RESULTS_K).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].review.restaurant, "Napoli Centro");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_search_with_city_filter() {
        let dir = tempdir().unwrap();
        let index = ReviewIndex::new(dir.path()).await.unwrap();

        let reviews = sample_reviews();
        index
            .add_reviews(&reviews, vec![one_hot(0), one_hot(0)])
            .await
            .unwrap();

        let hits = index
            .search(one_hot(0), Some("Jerusalem"), RESULTS_K)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].review.city, "Jerusalem");
    }

    #[tokio::test]
    async fn test_add_rejects_mismatched_embeddings() {
        let dir = tempdir().unwrap();
        let index = ReviewIndex::new(dir.path()).await.unwrap();

        let reviews = sample_reviews();
        let result = index.add_reviews(&reviews, vec![one_hot(0)]).await;
        assert!(result.is_err());

        let result = index
            .add_reviews(&reviews, vec![one_hot(0), vec![1.0, 0.0]])
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_corpus_loading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reviews.json");
        let corpus = serde_json::to_string(&sample_reviews()).unwrap();
        fs::write(&path, corpus).unwrap();

        let reviews = load_corpus(&path).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].restaurant, "Napoli Centro");
        assert_eq!(reviews[1].rating, 4.0);

        assert!(load_corpus(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_document_text_joins_restaurant_and_review() {
        let review = &sample_reviews()[0];
        assert_eq!(
            review.document_text(),
            "Napoli Centro Thin crust, blistered edges, perfect sauce."
        );
    }
}
