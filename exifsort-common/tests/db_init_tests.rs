//! Tests for database bootstrap

use exifsort_common::db::{ensure_writable, init_database};
use tempfile::TempDir;

#[tokio::test]
async fn test_init_creates_database_and_parent_directory() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("cache.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'file_metadata'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(tables.len(), 1);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO file_metadata (file_name, file_path, last_modified, metadata, metadata_after_prompt, last_updated)
         VALUES ('a.png', '/x/a.png', 1.0, 'k: v', '', 2.0)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_metadata")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1, "re-opening must keep existing rows");
}

#[tokio::test]
async fn test_file_name_is_unique() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("cache.db")).await.unwrap();

    let insert = "INSERT INTO file_metadata (file_name, file_path) VALUES ('a.png', ?)";
    sqlx::query(insert).bind("/x/a.png").execute(&pool).await.unwrap();
    let second = sqlx::query(insert).bind("/y/a.png").execute(&pool).await;
    assert!(second.is_err());
}

#[test]
fn test_ensure_writable_leaves_no_scratch_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache").join("cache.db");

    ensure_writable(&db_path).unwrap();

    let entries = std::fs::read_dir(temp_dir.path().join("cache")).unwrap().count();
    assert_eq!(entries, 0);
}

#[cfg(unix)]
#[test]
fn test_ensure_writable_rejects_directory_without_write_access() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let locked = temp_dir.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Privileged users write regardless of mode bits
    let privileged = std::fs::write(locked.join("check"), b"").is_ok();
    let result = ensure_writable(&locked.join("cache.db"));

    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    if privileged {
        assert!(result.is_ok());
        return;
    }
    assert!(matches!(result, Err(exifsort_common::Error::Config(_))));
}
