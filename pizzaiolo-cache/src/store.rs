//! SQLite persistence for cache entries
//!
//! One pool serves both the entry table and the metric events table. WAL
//! mode keeps lookups readable while a put is writing; the busy timeout
//! covers the brief writer-exclusive windows.
//!
//! Timestamps are stored as INTEGER unix epoch milliseconds. Embeddings are
//! stored as little-endian f32 bytes, sources as a JSON array, so an entry
//! always round-trips exactly.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntrySummary, SourceDocument};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{info, warn};

/// Current unix time in milliseconds, the storage clock for this module
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Serialize an embedding to little-endian f32 bytes
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding from little-endian f32 bytes
fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(CacheError::MalformedEntry(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap();
            f32::from_le_bytes(arr)
        })
        .collect())
}

/// Internal row type for cache entry queries
#[derive(sqlx::FromRow)]
struct EntryRow {
    id: i64,
    question: String,
    embedding: Vec<u8>,
    answer: String,
    sources: String,
    created_at: i64,
    hit_count: i64,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry> {
        let embedding = bytes_to_embedding(&self.embedding)?;
        let sources: Vec<SourceDocument> = serde_json::from_str(&self.sources)?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at)
            .ok_or_else(|| {
                CacheError::MalformedEntry(format!(
                    "created_at {} is out of range",
                    self.created_at
                ))
            })?;

        Ok(CacheEntry {
            id: self.id,
            question: self.question,
            embedding,
            answer: self.answer,
            sources,
            created_at,
            hit_count: self.hit_count,
        })
    }
}

/// SQLite-backed storage for cached question/answer entries
pub struct CacheStore {
    pool: SqlitePool,
    config: CacheConfig,
}

impl CacheStore {
    /// Open (or create) the database at the configured path
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", config.db_path))?
                .journal_mode(if config.wal_mode {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .create_if_missing(true)
                .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            config: config.clone(),
        };
        store.init_schema().await?;

        Ok(store)
    }

    /// Shared connection pool, also used by the metrics tracker
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes, and bring old databases up to date
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                embedding BLOB NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_cache_entries_created_at
            ON cache_entries(created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at INTEGER NOT NULL,
                query TEXT NOT NULL,
                cache_hit INTEGER NOT NULL,
                similarity REAL NOT NULL,
                time_saved_ms REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_metric_events_recorded_at
            ON metric_events(recorded_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.ensure_hit_count_column().await?;

        tracing::debug!(db_path = %self.config.db_path, "cache schema initialized");
        Ok(())
    }

    /// Databases created before hit tracking lack the hit_count column
    async fn ensure_hit_count_column(&self) -> Result<()> {
        let columns = sqlx::query("PRAGMA table_info(cache_entries)")
            .fetch_all(&self.pool)
            .await?;

        let mut has_hit_count = false;
        for column in &columns {
            let name: String = column.try_get("name")?;
            if name == "hit_count" {
                has_hit_count = true;
                break;
            }
        }

        if !has_hit_count {
            info!("adding hit_count column to cache_entries");
            sqlx::query(
                "ALTER TABLE cache_entries ADD COLUMN hit_count INTEGER NOT NULL DEFAULT 1",
            )
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Oldest created_at (exclusive) an entry may have and still be live
    fn expiry_cutoff_ms(&self) -> i64 {
        now_ms() - self.config.ttl.as_millis() as i64
    }

    /// Insert a new entry stamped with the current time, returning its id
    pub async fn insert_entry(
        &self,
        question: &str,
        embedding: &[f32],
        answer: &str,
        sources: &[SourceDocument],
    ) -> Result<i64> {
        let embedding_bytes = embedding_to_bytes(embedding);
        let sources_json = serde_json::to_string(sources)?;

        let result = sqlx::query(
            r#"
            INSERT INTO cache_entries (question, embedding, answer, sources, created_at, hit_count)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(question)
        .bind(&embedding_bytes)
        .bind(answer)
        .bind(&sources_json)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All unexpired entries, most recently created first
    ///
    /// Rows that fail to decode are skipped with a warning rather than
    /// failing the whole scan; one corrupt row must not take lookups down.
    pub async fn live_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, question, embedding, answer, sources, created_at, hit_count
            FROM cache_entries
            WHERE created_at > ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(self.expiry_cutoff_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_entry() {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(id, %err, "skipping malformed cache entry");
                        None
                    }
                }
            })
            .collect())
    }

    /// Bump the hit counter for an entry that just answered a lookup
    pub async fn increment_hit_count(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE cache_entries SET hit_count = hit_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of entries currently stored, expired ones included
    pub async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }

    /// Run the two-phase cleanup if the entry count has reached the trigger
    ///
    /// Phase one deletes expired entries. If the table is still at or above
    /// the trigger count, phase two deletes the oldest entries until the
    /// target count remains. Both phases commit in a single transaction, so
    /// a reader never observes the in-between state. Returns the number of
    /// entries deleted.
    pub async fn enforce_capacity(&self) -> Result<u64> {
        let trigger = self.config.cleanup_trigger_count();
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&mut *tx)
            .await?;
        if (count as u64) < trigger {
            tx.commit().await?;
            return Ok(0);
        }

        info!(entries = count, "running cache cleanup");

        let expired = sqlx::query("DELETE FROM cache_entries WHERE created_at <= ?")
            .bind(self.expiry_cutoff_ms())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&mut *tx)
            .await?;

        let mut evicted = 0;
        if remaining as u64 >= trigger {
            let to_delete = (remaining as u64).saturating_sub(self.config.cleanup_target_count());
            evicted = sqlx::query(
                r#"
                DELETE FROM cache_entries
                WHERE id IN (
                    SELECT id FROM cache_entries
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?
                )
                "#,
            )
            .bind(to_delete as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;

        info!(expired, evicted, "cache cleanup complete");
        Ok(expired + evicted)
    }

    /// Summaries of every stored entry, newest first, expired ones included
    pub async fn list_entries(&self) -> Result<Vec<EntrySummary>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT question, answer, created_at, hit_count
            FROM cache_entries
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(question, answer, created_at, hit_count)| {
                match DateTime::<Utc>::from_timestamp_millis(created_at) {
                    Some(ts) => Some(EntrySummary {
                        question,
                        answer,
                        created_at: ts,
                        hit_count,
                    }),
                    None => {
                        warn!(created_at, "skipping entry with out-of-range timestamp");
                        None
                    }
                }
            })
            .collect())
    }

    /// Total stored payload size: embedding blob plus answer and sources text
    pub async fn total_payload_bytes(&self) -> Result<u64> {
        let (bytes,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(LENGTH(embedding) + LENGTH(answer) + LENGTH(sources)), 0)
            FROM cache_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(bytes as u64)
    }
}
