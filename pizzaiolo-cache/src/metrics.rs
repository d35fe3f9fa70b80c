//! Lookup metrics recording and reporting
//!
//! Every lookup writes one event row, hit or miss. Reports aggregate the
//! trailing window on demand instead of keeping counters in memory, so they
//! survive restarts and cover every process sharing the database file.

use crate::error::Result;
use crate::store::now_ms;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::fmt;

/// One query in the most-frequent list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopQuery {
    /// Query text exactly as the lookup received it
    pub query: String,

    /// How many lookups used it inside the window
    pub count: u64,
}

/// Aggregated cache performance over a reporting window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    /// Window length in hours, trailing from now
    pub window_hours: i64,

    /// Lookups inside the window, hits and misses together
    pub total_queries: u64,

    /// Lookups answered from the cache
    pub cache_hits: u64,

    /// Lookups that fell through to generation
    pub cache_misses: u64,

    /// Mean similarity across hits, 0.0 when the window has no hits
    pub avg_similarity: f64,

    /// Mean time saved per hit in milliseconds, 0.0 when no hits
    pub avg_time_saved_ms: f64,

    /// Stored payload size across all current entries, not windowed
    pub cache_size_bytes: u64,

    /// Up to five most frequent queries in the window
    pub top_queries: Vec<TopQuery>,
}

impl CacheReport {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / self.total_queries as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheReport {{ window: {}h, queries: {}, hit_rate: {:.1}%, avg_similarity: {:.3}, avg_time_saved: {:.0}ms, size: {} bytes }}",
            self.window_hours,
            self.total_queries,
            self.hit_rate(),
            self.avg_similarity,
            self.avg_time_saved_ms,
            self.cache_size_bytes
        )
    }
}

/// Records one event per lookup and aggregates them on demand
///
/// Shares the cache store's pool; the events live in the same database file
/// as the entries they describe.
pub struct MetricsTracker {
    pool: SqlitePool,
}

impl MetricsTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record the outcome of one lookup
    pub async fn record(
        &self,
        query: &str,
        cache_hit: bool,
        similarity: f32,
        time_saved_ms: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_events (recorded_at, query, cache_hit, similarity, time_saved_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(now_ms())
        .bind(query)
        .bind(cache_hit)
        .bind(similarity)
        .bind(time_saved_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate a report over the trailing window
    pub async fn report(&self, window_hours: i64) -> Result<CacheReport> {
        let since = now_ms() - window_hours * 3600 * 1000;

        let (total, hits): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(cache_hit), 0)
            FROM metric_events
            WHERE recorded_at > ?
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        // averages over hits only; a run of misses must not drag them to zero
        let (avg_similarity, avg_time_saved_ms): (f64, f64) = sqlx::query_as(
            r#"
            SELECT COALESCE(AVG(similarity), 0.0), COALESCE(AVG(time_saved_ms), 0.0)
            FROM metric_events
            WHERE recorded_at > ? AND cache_hit = 1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let top_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT query, COUNT(*)
            FROM metric_events
            WHERE recorded_at > ?
            GROUP BY query
            ORDER BY COUNT(*) DESC, MIN(id) ASC
            LIMIT 5
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let (cache_size_bytes,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(LENGTH(embedding) + LENGTH(answer) + LENGTH(sources)), 0)
            FROM cache_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheReport {
            window_hours,
            total_queries: total as u64,
            cache_hits: hits as u64,
            cache_misses: (total - hits) as u64,
            avg_similarity,
            avg_time_saved_ms,
            cache_size_bytes: cache_size_bytes as u64,
            top_queries: top_rows
                .into_iter()
                .map(|(query, count)| TopQuery {
                    query,
                    count: count as u64,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(hits: u64, misses: u64) -> CacheReport {
        CacheReport {
            window_hours: 24,
            total_queries: hits + misses,
            cache_hits: hits,
            cache_misses: misses,
            avg_similarity: 0.95,
            avg_time_saved_ms: 1200.0,
            cache_size_bytes: 4096,
            top_queries: vec![],
        }
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(report_with(80, 20).hit_rate(), 80.0);
        assert_eq!(report_with(0, 0).hit_rate(), 0.0);
    }

    #[test]
    fn test_report_display() {
        let rendered = report_with(3, 1).to_string();
        assert!(rendered.contains("queries: 4"));
        assert!(rendered.contains("hit_rate: 75.0%"));
        assert!(rendered.contains("avg_similarity: 0.950"));
    }
}
