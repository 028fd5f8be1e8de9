//! Core record types shared by the pipelines and the store

use crate::services::normalizer::split_sections;
use exifsort_common::KeyStrategy;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Normalized metadata split on the section delimiter
///
/// `primary` is `None` only when there was no raw text at all; `secondary`
/// is empty when the raw text had no delimiter. Existing caches were written
/// with that asymmetry, so it is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataSections {
    pub primary: Option<String>,
    pub secondary: String,
}

/// Cached metadata as read back from the store
///
/// Both columns are nullable in existing cache files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedMetadata {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl CachedMetadata {
    /// Both sections present and non-empty
    pub fn is_complete(&self) -> bool {
        matches!(
            (&self.primary, &self.secondary),
            (Some(p), Some(s)) if !p.is_empty() && !s.is_empty()
        )
    }
}

/// One row of the metadata cache
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    /// Unique key (`file_name` column)
    pub key: String,
    pub file_path: String,
    /// Modification time at extraction, fractional Unix seconds
    pub last_modified: f64,
    pub sections: MetadataSections,
}

impl MetadataRecord {
    /// Build a record from freshly extracted text
    ///
    /// Reads the file's modification time, so this fails for a file that
    /// vanished or became unreadable since extraction.
    pub fn from_extraction(path: &Path, raw: &str, strategy: KeyStrategy) -> io::Result<Self> {
        let modified = std::fs::metadata(path)?.modified()?;

        Ok(Self {
            key: record_key(path, strategy)?,
            file_path: path.to_string_lossy().into_owned(),
            last_modified: system_time_to_unix(modified),
            sections: split_sections(Some(raw)),
        })
    }
}

/// Derive the unique record key for `path`
pub fn record_key(path: &Path, strategy: KeyStrategy) -> io::Result<String> {
    match strategy {
        KeyStrategy::FileName => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            }),
        KeyStrategy::PathHash => {
            let canonical = path.canonicalize()?;
            let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
            Ok(format!("{:x}", digest))
        }
    }
}

/// Fractional Unix seconds, the timestamp format of the cache columns
pub fn system_time_to_unix(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Current time as fractional Unix seconds
pub fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_key_ignores_directory() {
        let a = record_key(Path::new("/one/img.png"), KeyStrategy::FileName).unwrap();
        let b = record_key(Path::new("/two/img.png"), KeyStrategy::FileName).unwrap();
        assert_eq!(a, "img.png");
        assert_eq!(a, b);
    }

    #[test]
    fn test_path_hash_key_separates_same_names() {
        let temp_dir = TempDir::new().unwrap();
        let one = temp_dir.path().join("one");
        let two = temp_dir.path().join("two");
        std::fs::create_dir_all(&one).unwrap();
        std::fs::create_dir_all(&two).unwrap();
        std::fs::write(one.join("img.png"), b"x").unwrap();
        std::fs::write(two.join("img.png"), b"x").unwrap();

        let a = record_key(&one.join("img.png"), KeyStrategy::PathHash).unwrap();
        let b = record_key(&two.join("img.png"), KeyStrategy::PathHash).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_from_extraction_fails_for_missing_file() {
        let result = MetadataRecord::from_extraction(
            Path::new("/definitely/not/here.png"),
            "a: b",
            KeyStrategy::FileName,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cached_metadata_completeness() {
        let full = CachedMetadata {
            primary: Some("a: b".into()),
            secondary: Some("c: d".into()),
        };
        assert!(full.is_complete());

        let no_secondary = CachedMetadata {
            primary: Some("a: b".into()),
            secondary: Some(String::new()),
        };
        assert!(!no_secondary.is_complete());
        assert!(!CachedMetadata::default().is_complete());
    }
}
