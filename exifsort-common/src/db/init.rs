//! Database initialization
//!
//! Opens (or creates) the single-file metadata cache and makes sure the
//! `file_metadata` table exists. Safe to call on every startup.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Initialize database connection pool and create the cache table if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    ensure_writable(db_path)?;

    // WAL lets the relocation readers run while a batch flush holds the writer.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_file_metadata_table(&pool).await?;

    Ok(pool)
}

/// Create the `file_metadata` table and its path index
///
/// Column layout matches cache files written by earlier versions of the tool,
/// so existing databases are opened as-is.
pub async fn create_file_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_metadata (
            file_name TEXT UNIQUE,
            file_path TEXT,
            last_modified REAL,
            metadata TEXT,
            metadata_after_prompt TEXT,
            last_updated REAL,
            PRIMARY KEY (file_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Lookups and path rewrites are keyed by path, not by the primary key
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_file_metadata_path ON file_metadata(file_path)",
    )
    .execute(pool)
    .await?;

    debug!("file_metadata table ready");

    Ok(())
}

/// Make sure the database location can be written before any work starts
///
/// Creates the parent directory when missing, then creates and removes a
/// scratch file in it. A parent we cannot write to is reported
/// as a configuration error rather than surfacing later as a failed batch.
pub fn ensure_writable(db_path: &Path) -> Result<()> {
    let parent = match db_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };

    std::fs::create_dir_all(parent)?;

    // Permission bits alone ignore ownership
    match tempfile::NamedTempFile::new_in(parent) {
        Ok(_scratch) => Ok(()),
        Err(e) => Err(Error::Config(format!(
            "No write permission in directory: {} ({})",
            parent.display(),
            e
        ))),
    }
}
