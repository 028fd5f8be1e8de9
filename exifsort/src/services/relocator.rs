//! Query/relocation engine
//!
//! Looks up each eligible file's cached metadata, moves files whose metadata
//! contains both the search key and value into a target directory, and
//! rewrites their cached paths.
//!
//! Files are processed in sequential batches. Within a batch up to `workers`
//! files are checked and moved concurrently; the batch's path rewrites are
//! flushed to the cache before the next batch starts, so the cache lags the
//! filesystem by at most one batch.

use crate::db::MetadataStore;
use crate::error::{RunError, RunResult};
use crate::services::file_scanner::FileScanner;
use crate::types::CachedMetadata;
use exifsort_common::AppConfig;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Which cached sections are searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Prompt section only
    #[default]
    PrimaryOnly,
    /// Prompt and negative-prompt sections
    Full,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "prompt" | "primary" => Ok(SearchMode::PrimaryOnly),
            "2" | "full" | "all" => Ok(SearchMode::Full),
            other => Err(format!("unknown search mode '{}'", other)),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::PrimaryOnly => write!(f, "prompt"),
            SearchMode::Full => write!(f, "full"),
        }
    }
}

/// Key/value pair a file's metadata must contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    key: String,
    value: String,
}

impl SearchCriteria {
    /// The key is lower-cased to line up with normalized keys; the value is
    /// matched literally.
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.trim().to_lowercase(),
            value: value.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Substring match against the sections selected by `mode`
    ///
    /// Metadata missing either section never matches.
    pub fn matches(&self, metadata: &CachedMetadata, mode: SearchMode) -> bool {
        if !metadata.is_complete() {
            return false;
        }
        let primary = metadata.primary.as_deref().unwrap_or_default();
        let secondary = metadata.secondary.as_deref().unwrap_or_default();

        let haystack = match mode {
            SearchMode::PrimaryOnly => primary.to_string(),
            SearchMode::Full => format!("{} {}", primary, secondary),
        };

        haystack.contains(&self.key) && haystack.contains(&self.value)
    }
}

/// Counters for one search-and-move run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub processed: usize,
    pub moved: usize,
    pub not_matched: usize,
    /// No cached row, or a row lacking one of the sections
    pub no_metadata: usize,
    /// Destination already taken or file already in the target
    pub skipped: usize,
    /// Store lookup or filesystem move failed
    pub failed: usize,
    /// Cached rows whose path was rewritten
    pub paths_updated: usize,
}

#[derive(Debug)]
enum FileOutcome {
    Moved { from: PathBuf, to: PathBuf },
    NotMatched,
    NoMetadata,
    Skipped,
    Failed,
}

/// Search-and-move over cached metadata
pub struct Relocator {
    store: MetadataStore,
    scanner: FileScanner,
    workers: usize,
}

impl Relocator {
    pub fn new(store: MetadataStore, config: &AppConfig) -> Self {
        Self {
            store,
            scanner: FileScanner::from_config(config),
            workers: config.workers.max(1),
        }
    }

    pub fn with_scanner(mut self, scanner: FileScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Move every eligible file under `source_dirs` whose cached metadata
    /// matches `criteria` into `target_dir`
    pub async fn search_and_move(
        &self,
        source_dirs: &[PathBuf],
        target_dir: &Path,
        criteria: &SearchCriteria,
        mode: SearchMode,
        batch_size: usize,
    ) -> RunResult<RelocationReport> {
        if source_dirs.is_empty() {
            return Err(RunError::InvalidArgument(
                "at least one source directory is required".to_string(),
            ));
        }
        if !target_dir.is_dir() {
            return Err(RunError::InvalidArgument(format!(
                "target directory {} does not exist",
                target_dir.display()
            )));
        }
        if batch_size == 0 {
            return Err(RunError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }

        let files = self.scanner.scan_all(source_dirs);
        let total_files = files.len();

        tracing::info!("Total files to process: {}", total_files);
        tracing::info!("Processing in batches of {}", batch_size);
        tracing::info!(
            key = %criteria.key(),
            value = %criteria.value(),
            mode = %mode,
            "Searching metadata"
        );

        let mut report = RelocationReport::default();
        // Destinations claimed in this run; two same-named sources must not
        // race for one target file.
        let claimed: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());

        for batch in files.chunks(batch_size) {
            let outcomes: Vec<FileOutcome> = stream::iter(batch)
                .map(|path| self.process_file(path, target_dir, criteria, mode, &claimed))
                .buffer_unordered(self.workers)
                .collect()
                .await;

            let mut moves = Vec::new();
            for outcome in outcomes {
                report.processed += 1;
                match outcome {
                    FileOutcome::Moved { from, to } => {
                        report.moved += 1;
                        moves.push((
                            from.to_string_lossy().into_owned(),
                            to.to_string_lossy().into_owned(),
                        ));
                    }
                    FileOutcome::NotMatched => report.not_matched += 1,
                    FileOutcome::NoMetadata => report.no_metadata += 1,
                    FileOutcome::Skipped => report.skipped += 1,
                    FileOutcome::Failed => report.failed += 1,
                }
            }

            if !moves.is_empty() {
                match self.store.rewrite_paths_batch(&moves).await {
                    Ok(outcome) => report.paths_updated += outcome.written,
                    Err(e) => tracing::error!(
                        moves = moves.len(),
                        error = %e,
                        "Error in batch updating file paths"
                    ),
                }
            }

            tracing::info!(
                progress = format!("{}/{}", report.processed, total_files),
                moved = report.moved,
                "Searching and moving files"
            );
        }

        tracing::info!("Search complete. Processed {} files.", report.processed);
        tracing::info!("Moved {} files to {}", report.moved, target_dir.display());

        Ok(report)
    }

    async fn process_file(
        &self,
        path: &Path,
        target_dir: &Path,
        criteria: &SearchCriteria,
        mode: SearchMode,
        claimed: &Mutex<HashSet<PathBuf>>,
    ) -> FileOutcome {
        tracing::debug!(path = %path.display(), "Processing file");

        let metadata = match self.store.get(&path.to_string_lossy()).await {
            Ok(Some(metadata)) if metadata.is_complete() => metadata,
            Ok(_) => {
                tracing::debug!(path = %path.display(), "No metadata found for file");
                return FileOutcome::NoMetadata;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Error processing file");
                return FileOutcome::Failed;
            }
        };

        if !criteria.matches(&metadata, mode) {
            return FileOutcome::NotMatched;
        }

        let Some(file_name) = path.file_name() else {
            return FileOutcome::Failed;
        };
        let destination = target_dir.join(file_name);

        if destination == path {
            tracing::debug!(path = %path.display(), "File already in target directory");
            return FileOutcome::Skipped;
        }

        let newly_claimed = match claimed.lock() {
            Ok(mut set) => set.insert(destination.clone()),
            Err(poisoned) => poisoned.into_inner().insert(destination.clone()),
        };
        if !newly_claimed || destination.exists() {
            tracing::warn!(
                from = %path.display(),
                to = %destination.display(),
                "Destination already exists, not moving"
            );
            return FileOutcome::Skipped;
        }

        match move_file(path, &destination).await {
            Ok(()) => {
                tracing::debug!(to = %destination.display(), "File moved");
                FileOutcome::Moved {
                    from: path.to_path_buf(),
                    to: destination,
                }
            }
            Err(e) => {
                tracing::error!(
                    from = %path.display(),
                    to = %destination.display(),
                    error = %e,
                    "Error moving file"
                );
                FileOutcome::Failed
            }
        }
    }
}

/// Rename, falling back to copy + remove when the rename cannot cross
/// filesystems
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    let rename_err = match tokio::fs::rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !tokio::fs::try_exists(from).await.unwrap_or(false) {
        return Err(rename_err);
    }

    if let Err(e) = tokio::fs::copy(from, to).await {
        // Drop a partial copy
        let _ = tokio::fs::remove_file(to).await;
        tracing::debug!(to = %to.display(), error = %e, "Copy fallback failed");
        return Err(rename_err);
    }

    if let Err(e) = tokio::fs::remove_file(from).await {
        // Keep exactly one copy
        let _ = tokio::fs::remove_file(to).await;
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(primary: &str, secondary: &str) -> CachedMetadata {
        CachedMetadata {
            primary: Some(primary.to_string()),
            secondary: Some(secondary.to_string()),
        }
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("1".parse::<SearchMode>().unwrap(), SearchMode::PrimaryOnly);
        assert_eq!("full".parse::<SearchMode>().unwrap(), SearchMode::Full);
        assert!("3".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_key_is_lowercased_value_is_literal() {
        let criteria = SearchCriteria::new("Parameters", "Castle");
        let meta = metadata("parameters: a Castle at dusk", "blurry: yes");

        assert!(criteria.matches(&meta, SearchMode::PrimaryOnly));
        assert!(!SearchCriteria::new("parameters", "castle").matches(&meta, SearchMode::PrimaryOnly));
    }

    #[test]
    fn test_secondary_only_match_requires_full_mode() {
        let criteria = SearchCriteria::new("parameters", "lowres");
        let meta = metadata("parameters: a castle", "lowres, blurry");

        assert!(!criteria.matches(&meta, SearchMode::PrimaryOnly));
        assert!(criteria.matches(&meta, SearchMode::Full));
    }

    #[tokio::test]
    async fn test_move_file_renames() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let from = temp_dir.path().join("a.png");
        let to = temp_dir.path().join("b.png");
        std::fs::write(&from, b"image").unwrap();

        move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"image");
    }

    #[tokio::test]
    async fn test_failed_move_leaves_no_destination_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let from = temp_dir.path().join("a.png");
        let to = temp_dir.path().join("missing").join("a.png");
        std::fs::write(&from, b"image").unwrap();

        assert!(move_file(&from, &to).await.is_err());

        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn test_incomplete_metadata_never_matches() {
        let criteria = SearchCriteria::new("parameters", "castle");
        let meta = metadata("parameters: a castle", "");

        assert!(!criteria.matches(&meta, SearchMode::PrimaryOnly));
        assert!(!criteria.matches(&CachedMetadata::default(), SearchMode::Full));
    }
}
