//! Metadata cache operations
//!
//! One row per record key in `file_metadata`. Writes are last-write-wins on
//! the key; reads and path rewrites are keyed by the file's current path.
//! Batch operations run in a single transaction and isolate per-row
//! failures; single-row operations return their errors to the caller.
//!
//! Under [`KeyStrategy::PathHash`] the key is derived from the path, so a
//! path rewrite re-keys the row and drops any stale row already holding the
//! new key or the new path.

use crate::types::{now_unix, record_key, CachedMetadata, MetadataRecord};
use crate::utils::retry_on_lock;
use exifsort_common::{AppConfig, KeyStrategy, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of a batched write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows inserted, overwritten or rewritten
    pub written: usize,
    /// Rows whose statement failed and were skipped
    pub failed: usize,
    /// Rewrites whose old path had no cached row
    pub unmatched: usize,
}

/// Full cached row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub file_path: Option<String>,
    pub last_modified: Option<f64>,
    pub metadata: CachedMetadata,
    pub last_updated: Option<f64>,
}

/// Handle to the metadata cache
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
    key_strategy: KeyStrategy,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
            key_strategy: KeyStrategy::default(),
        }
    }

    /// Key strategy the cached rows were written with
    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    /// Open (creating if needed) the cache configured in `config`
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let pool = exifsort_common::db::init_database(&config.database_path).await?;
        Ok(Self::new(pool, config.max_lock_wait_ms).with_key_strategy(config.key_strategy))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or overwrite each record, keyed by `record.key`
    ///
    /// Stamps every row with the same `last_updated`. A record whose statement
    /// fails is logged and counted in `failed`; the others still commit.
    pub async fn upsert_batch(&self, records: &[MetadataRecord]) -> Result<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let now = now_unix();
        let outcome = retry_on_lock("metadata upsert batch", self.max_lock_wait_ms, move || {
            self.write_upserts(records, now)
        })
        .await?;

        debug!(
            written = outcome.written,
            failed = outcome.failed,
            "Upserted metadata batch"
        );
        Ok(outcome)
    }

    async fn write_upserts(&self, records: &[MetadataRecord], now: f64) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for record in records {
            match upsert_one(&mut tx, record, now).await {
                Ok(()) => outcome.written += 1,
                // Whole batch goes back to retry_on_lock
                Err(e) if e.is_lock_contention() => return Err(e),
                Err(e) => {
                    warn!(
                        key = %record.key,
                        path = %record.file_path,
                        error = %e,
                        "Failed to upsert metadata record"
                    );
                    outcome.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Cached sections for the file currently at `file_path`
    pub async fn get(&self, file_path: &str) -> Result<Option<CachedMetadata>> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT metadata, metadata_after_prompt FROM file_metadata WHERE file_path = ? LIMIT 1",
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((primary, secondary)) => {
                debug!(path = %file_path, "Metadata found");
                Ok(Some(CachedMetadata { primary, secondary }))
            }
            None => {
                debug!(path = %file_path, "No metadata found");
                Ok(None)
            }
        }
    }

    /// Cached secondary section only; `None` when no row or a NULL column
    pub async fn get_secondary(&self, file_path: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> = sqlx::query_scalar(
            "SELECT metadata_after_prompt FROM file_metadata WHERE file_path = ? LIMIT 1",
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }

    /// Full row for the file currently at `file_path`
    pub async fn get_record(&self, file_path: &str) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT file_name, file_path, last_modified, metadata, metadata_after_prompt, last_updated
            FROM file_metadata
            WHERE file_path = ?
            LIMIT 1
            "#,
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredRecord {
            key: row.get("file_name"),
            file_path: row.get("file_path"),
            last_modified: row.get("last_modified"),
            metadata: CachedMetadata {
                primary: row.get("metadata"),
                secondary: row.get("metadata_after_prompt"),
            },
            last_updated: row.get("last_updated"),
        }))
    }

    /// Point the row at `old_path` to `new_path`
    ///
    /// Returns whether a row matched. No match is only a warning: the file may
    /// never have been indexed.
    pub async fn rewrite_path(&self, old_path: &str, new_path: &str) -> Result<bool> {
        let new_key = self.key_for_moved_path(new_path);

        let mut tx = self.pool.begin().await?;
        let rows = rewrite_one(&mut tx, old_path, new_path, new_key.as_deref(), now_unix()).await?;
        tx.commit().await?;

        if rows == 0 {
            warn!(path = %old_path, "No database entry found for file");
            return Ok(false);
        }

        info!("Updated file path in database: {} -> {}", old_path, new_path);
        Ok(true)
    }

    /// Apply many `(old_path, new_path)` rewrites in one transaction
    ///
    /// Unmatched paths and failing rows are counted, not fatal.
    pub async fn rewrite_paths_batch(&self, moves: &[(String, String)]) -> Result<BatchOutcome> {
        if moves.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let now = now_unix();
        let outcome = retry_on_lock("path rewrite batch", self.max_lock_wait_ms, move || {
            self.write_rewrites(moves, now)
        })
        .await?;

        info!(
            requested = moves.len(),
            updated = outcome.written,
            unmatched = outcome.unmatched,
            failed = outcome.failed,
            "Batch updated file paths in the database"
        );
        Ok(outcome)
    }

    async fn write_rewrites(&self, moves: &[(String, String)], now: f64) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for (old_path, new_path) in moves {
            let new_key = self.key_for_moved_path(new_path);

            match rewrite_one(&mut tx, old_path, new_path, new_key.as_deref(), now).await {
                Ok(0) => {
                    warn!(path = %old_path, "No database entry found for file");
                    outcome.unmatched += 1;
                }
                Ok(_) => outcome.written += 1,
                Err(e) => {
                    if e.is_lock_contention() {
                        return Err(e);
                    }
                    warn!(path = %old_path, error = %e, "Failed to rewrite file path");
                    outcome.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Key for a row whose file now lives at `new_path`
    ///
    /// `None` when the key does not depend on the directory, or when the new
    /// path cannot be resolved (the row then keeps its old key).
    fn key_for_moved_path(&self, new_path: &str) -> Option<String> {
        match self.key_strategy {
            KeyStrategy::FileName => None,
            KeyStrategy::PathHash => match record_key(Path::new(new_path), self.key_strategy) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(path = %new_path, error = %e, "Cannot derive key for moved file");
                    None
                }
            },
        }
    }

    /// Number of cached rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_metadata")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Point the row at `old_path` to `new_path`, re-keying it when `new_key`
/// is given; returns the number of rows moved
async fn rewrite_one(
    conn: &mut SqliteConnection,
    old_path: &str,
    new_path: &str,
    new_key: Option<&str>,
    now: f64,
) -> Result<u64> {
    let Some(new_key) = new_key else {
        let result = sqlx::query(
            "UPDATE file_metadata SET file_path = ?, last_updated = ? WHERE file_path = ?",
        )
        .bind(new_path)
        .bind(now)
        .bind(old_path)
        .execute(&mut *conn)
        .await?;
        return Ok(result.rows_affected());
    };

    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM file_metadata WHERE file_path = ? LIMIT 1")
            .bind(old_path)
            .fetch_optional(&mut *conn)
            .await?;
    if exists.is_none() {
        return Ok(0);
    }

    let stale = sqlx::query(
        "DELETE FROM file_metadata WHERE file_path <> ? AND (file_name = ? OR file_path = ?)",
    )
    .bind(old_path)
    .bind(new_key)
    .bind(new_path)
    .execute(&mut *conn)
    .await?;
    if stale.rows_affected() > 0 {
        debug!(path = %new_path, rows = stale.rows_affected(), "Dropped stale rows for moved file");
    }

    let result = sqlx::query(
        "UPDATE file_metadata SET file_name = ?, file_path = ?, last_updated = ? WHERE file_path = ?",
    )
    .bind(new_key)
    .bind(new_path)
    .bind(now)
    .bind(old_path)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_one(conn: &mut SqliteConnection, record: &MetadataRecord, now: f64) -> Result<()> {
    let previous: Option<Option<String>> =
        sqlx::query_scalar("SELECT file_path FROM file_metadata WHERE file_name = ?")
            .bind(&record.key)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(Some(previous)) = previous {
        if previous != record.file_path {
            warn!(
                key = %record.key,
                previous = %previous,
                new = %record.file_path,
                "Record key already cached for another path, overwriting"
            );
        }
    }

    sqlx::query(
        r#"
        INSERT INTO file_metadata (file_name, file_path, last_modified, metadata, metadata_after_prompt, last_updated)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_name) DO UPDATE SET
            file_path = excluded.file_path,
            last_modified = excluded.last_modified,
            metadata = excluded.metadata,
            metadata_after_prompt = excluded.metadata_after_prompt,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&record.key)
    .bind(&record.file_path)
    .bind(record.last_modified)
    .bind(&record.sections.primary)
    .bind(&record.sections.secondary)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
