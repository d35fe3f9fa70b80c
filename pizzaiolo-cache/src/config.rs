//! Configuration for the semantic cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the semantic response cache
///
/// The defaults are the tuned production values: a 0.92 cosine similarity
/// threshold, a 7 day TTL, and a 1000 entry capacity with cleanup kicking in
/// at 80% occupancy and compacting down to 60%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite database file (":memory:" for ephemeral caches)
    pub db_path: String,

    /// Minimum cosine similarity for a stored question to count as a hit.
    /// The comparison is inclusive: a candidate exactly at the threshold
    /// qualifies.
    pub similarity_threshold: f32,

    /// Time-to-live for cache entries. Entries older than this are never
    /// returned by lookups and are deleted by the cleanup pass.
    pub ttl: Duration,

    /// Maximum number of entries in the cache
    pub max_entries: usize,

    /// Questions with fewer whitespace-separated words than this are not
    /// worth caching
    pub min_query_words: usize,

    /// Occupancy ratio (of `max_entries`) at which the pre-insert cleanup
    /// pass starts deleting entries
    pub cleanup_trigger_ratio: f64,

    /// Occupancy ratio the cleanup pass compacts down to when expiry alone
    /// was not enough
    pub cleanup_target_ratio: f64,

    /// Enable WAL journal mode so lookups keep reading while an insert
    /// transaction writes
    pub wal_mode: bool,

    /// Maximum connections in the SQLite pool
    pub max_connections: u32,

    /// Busy timeout for locked-table contention
    pub busy_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: "pizza_cache.db".to_string(),
            similarity_threshold: 0.92,
            // 7 days
            ttl: Duration::from_secs(7 * 24 * 3600),
            max_entries: 1000,
            min_query_words: 4,
            cleanup_trigger_ratio: 0.8,
            cleanup_target_ratio: 0.6,
            wal_mode: true,
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with defaults at the given database path
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// In-memory configuration for tests and ephemeral use.
    ///
    /// Every `:memory:` connection opens a distinct database, so the pool is
    /// pinned to a single connection and WAL is disabled.
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            wal_mode: false,
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(CacheError::ConfigError(
                "db_path must not be empty".to_string(),
            ));
        }

        if self.max_entries == 0 {
            return Err(CacheError::ConfigError(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.min_query_words == 0 {
            return Err(CacheError::ConfigError(
                "min_query_words must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CacheError::ConfigError(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.cleanup_trigger_ratio)
            || !(0.0..1.0).contains(&self.cleanup_target_ratio)
        {
            return Err(CacheError::ConfigError(
                "cleanup ratios must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.cleanup_target_ratio >= self.cleanup_trigger_ratio {
            return Err(CacheError::ConfigError(
                "cleanup_target_ratio must be below cleanup_trigger_ratio".to_string(),
            ));
        }

        if self.ttl.is_zero() {
            return Err(CacheError::ConfigError(
                "ttl must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Smallest entry count at which the cleanup pass triggers
    pub fn cleanup_trigger_count(&self) -> u64 {
        (self.max_entries as f64 * self.cleanup_trigger_ratio).ceil() as u64
    }

    /// Entry count the age-based deletion phase compacts down to
    pub fn cleanup_target_count(&self) -> u64 {
        (self.max_entries as f64 * self.cleanup_target_ratio) as u64
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    db_path: Option<String>,
    similarity_threshold: Option<f32>,
    ttl: Option<Duration>,
    max_entries: Option<usize>,
    min_query_words: Option<usize>,
    cleanup_trigger_ratio: Option<f64>,
    cleanup_target_ratio: Option<f64>,
    wal_mode: Option<bool>,
    max_connections: Option<u32>,
    busy_timeout: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set the database file path
    pub fn db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Set the similarity threshold for cache hits
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Set the entry time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set maximum number of cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set the minimum word count for cacheable questions
    pub fn min_query_words(mut self, words: usize) -> Self {
        self.min_query_words = Some(words);
        self
    }

    /// Set the occupancy ratio that triggers cleanup
    pub fn cleanup_trigger_ratio(mut self, ratio: f64) -> Self {
        self.cleanup_trigger_ratio = Some(ratio);
        self
    }

    /// Set the occupancy ratio cleanup compacts down to
    pub fn cleanup_target_ratio(mut self, ratio: f64) -> Self {
        self.cleanup_target_ratio = Some(ratio);
        self
    }

    /// Enable or disable WAL journal mode
    pub fn wal_mode(mut self, enable: bool) -> Self {
        self.wal_mode = Some(enable);
        self
    }

    /// Set the connection pool size
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set the busy timeout for locked-table contention
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            db_path: self.db_path.unwrap_or(defaults.db_path),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            ttl: self.ttl.unwrap_or(defaults.ttl),
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            min_query_words: self.min_query_words.unwrap_or(defaults.min_query_words),
            cleanup_trigger_ratio: self
                .cleanup_trigger_ratio
                .unwrap_or(defaults.cleanup_trigger_ratio),
            cleanup_target_ratio: self
                .cleanup_target_ratio
                .unwrap_or(defaults.cleanup_target_ratio),
            wal_mode: self.wal_mode.unwrap_or(defaults.wal_mode),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            busy_timeout: self.busy_timeout.unwrap_or(defaults.busy_timeout),
        }
    }
}
