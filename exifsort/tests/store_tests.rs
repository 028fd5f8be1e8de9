//! Metadata store integration tests

use exifsort::db::MetadataStore;
use exifsort::services::normalizer::split_sections;
use exifsort::types::{record_key, MetadataRecord};
use exifsort_common::db::init_database;
use exifsort_common::KeyStrategy;
use tempfile::TempDir;

async fn open_store(temp_dir: &TempDir) -> MetadataStore {
    let pool = init_database(&temp_dir.path().join("cache.db")).await.unwrap();
    MetadataStore::new(pool, 1000)
}

fn record(key: &str, path: &str, raw: &str) -> MetadataRecord {
    MetadataRecord {
        key: key.to_string(),
        file_path: path.to_string(),
        last_modified: 1_700_000_000.5,
        sections: split_sections(Some(raw)),
    }
}

#[tokio::test]
async fn test_upsert_then_get_by_path() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;

    let outcome = store
        .upsert_batch(&[record("a.png", "/img/a.png", "Steps: 20\nNegative prompt: Blurry: yes")])
        .await
        .unwrap();
    assert_eq!(outcome.written, 1);

    let cached = store.get("/img/a.png").await.unwrap().unwrap();
    assert_eq!(cached.primary.as_deref(), Some("steps: 20"));
    assert_eq!(cached.secondary.as_deref(), Some("blurry: yes"));

    let full = store.get_record("/img/a.png").await.unwrap().unwrap();
    assert_eq!(full.key, "a.png");
    assert_eq!(full.last_modified, Some(1_700_000_000.5));
    assert!(full.last_updated.is_some());
}

#[tokio::test]
async fn test_last_write_wins_on_key() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;

    store
        .upsert_batch(&[record("a.png", "/one/a.png", "model: first")])
        .await
        .unwrap();
    store
        .upsert_batch(&[record("a.png", "/two/a.png", "model: second")])
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.get("/one/a.png").await.unwrap().is_none());
    let cached = store.get("/two/a.png").await.unwrap().unwrap();
    assert_eq!(cached.primary.as_deref(), Some("model: second"));
}

#[tokio::test]
async fn test_missing_path_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;

    assert!(store.get("/nowhere.png").await.unwrap().is_none());
    assert!(store.get_secondary("/nowhere.png").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rewrite_path_without_row_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    store
        .upsert_batch(&[record("a.png", "/img/a.png", "k: v")])
        .await
        .unwrap();

    assert!(!store.rewrite_path("/img/missing.png", "/out/missing.png").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.get("/img/a.png").await.unwrap().is_some());
}

#[tokio::test]
async fn test_rewrite_path_moves_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    store
        .upsert_batch(&[record("a.png", "/img/a.png", "k: v")])
        .await
        .unwrap();

    assert!(store.rewrite_path("/img/a.png", "/out/a.png").await.unwrap());
    assert!(store.get("/img/a.png").await.unwrap().is_none());
    assert!(store.get("/out/a.png").await.unwrap().is_some());
}

#[tokio::test]
async fn test_batch_rewrite_counts_unmatched() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    store
        .upsert_batch(&[
            record("a.png", "/img/a.png", "k: v"),
            record("b.png", "/img/b.png", "k: v"),
        ])
        .await
        .unwrap();

    let outcome = store
        .rewrite_paths_batch(&[
            ("/img/a.png".to_string(), "/out/a.png".to_string()),
            ("/img/b.png".to_string(), "/out/b.png".to_string()),
            ("/img/c.png".to_string(), "/out/c.png".to_string()),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.unmatched, 1);
    assert!(store.get("/out/b.png").await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_store(&temp_dir).await;
        store
            .upsert_batch(&[record("a.png", "/img/a.png", "k: v")])
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = open_store(&temp_dir).await;
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_null_sections_from_existing_cache() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    sqlx::query(
        "INSERT INTO file_metadata (file_name, file_path, last_modified, metadata, metadata_after_prompt, last_updated)
         VALUES ('old.png', '/img/old.png', 1.0, NULL, NULL, 2.0)",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let cached = store.get("/img/old.png").await.unwrap().unwrap();
    assert!(cached.primary.is_none());
    assert!(!cached.is_complete());
}

#[tokio::test]
async fn test_failing_row_does_not_sink_batch() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    sqlx::query(
        "CREATE TRIGGER reject_broken BEFORE INSERT ON file_metadata
         WHEN NEW.file_name = 'broken.png'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let outcome = store
        .upsert_batch(&[
            record("a.png", "/img/a.png", "k: v"),
            record("broken.png", "/img/broken.png", "k: v"),
            record("c.png", "/img/c.png", "k: v"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(store.get("/img/broken.png").await.unwrap().is_none());
    assert!(store.get("/img/c.png").await.unwrap().is_some());
}

#[tokio::test]
async fn test_path_hash_rewrite_rekeys_row() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::create_dir_all(&dst).unwrap();
    let old = src.join("a.png");
    let new = dst.join("a.png");
    std::fs::write(&old, b"image").unwrap();

    let store = open_store(&temp_dir)
        .await
        .with_key_strategy(KeyStrategy::PathHash);
    let first = MetadataRecord::from_extraction(&old, "k: v", KeyStrategy::PathHash).unwrap();
    store.upsert_batch(&[first]).await.unwrap();

    std::fs::rename(&old, &new).unwrap();
    assert!(store
        .rewrite_path(&old.to_string_lossy(), &new.to_string_lossy())
        .await
        .unwrap());

    let moved = store.get_record(&new.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(moved.key, record_key(&new, KeyStrategy::PathHash).unwrap());

    // Re-ingesting from the new location overwrites the same row
    let again = MetadataRecord::from_extraction(&new, "k: w", KeyStrategy::PathHash).unwrap();
    store.upsert_batch(&[again]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let cached = store.get(&new.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(cached.primary.as_deref(), Some("k: w"));
}

#[tokio::test]
async fn test_path_hash_batch_rewrite_drops_stale_row_for_new_path() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::create_dir_all(&dst).unwrap();
    let old = src.join("a.png");
    let new = dst.join("a.png");
    std::fs::write(&old, b"image").unwrap();

    let store = open_store(&temp_dir)
        .await
        .with_key_strategy(KeyStrategy::PathHash);
    let current = MetadataRecord::from_extraction(&old, "k: current", KeyStrategy::PathHash).unwrap();
    // Left over from a file that used to live at the destination
    let stale = record("stale-key", &new.to_string_lossy(), "k: stale");
    store.upsert_batch(&[current, stale]).await.unwrap();

    std::fs::rename(&old, &new).unwrap();
    let outcome = store
        .rewrite_paths_batch(&[(
            old.to_string_lossy().into_owned(),
            new.to_string_lossy().into_owned(),
        )])
        .await
        .unwrap();

    assert_eq!(outcome.written, 1);
    assert_eq!(store.count().await.unwrap(), 1);
    let cached = store.get(&new.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(cached.primary.as_deref(), Some("k: current"));
}
