//! Image file scanner
//!
//! Recursive discovery of eligible images: directory traversal without
//! following symlinks, case-insensitive extension filter, and an admission
//! check through a [`PathValidator`] for every candidate.

use crate::error::ValidationError;
use exifsort_common::AppConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors for the root directory itself
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Decides whether a discovered path may be processed
pub trait PathValidator: Send + Sync {
    fn admit(&self, candidate: &Path, root: &Path) -> Result<(), ValidationError>;
}

/// Accepts paths that resolve inside the scanned root
///
/// Catches symlinked files pointing outside the tree being processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithinRoot;

impl PathValidator for WithinRoot {
    fn admit(&self, candidate: &Path, root: &Path) -> Result<(), ValidationError> {
        if !candidate.exists() {
            return Err(ValidationError::Missing(candidate.to_path_buf()));
        }

        let canonical_path = candidate
            .canonicalize()
            .map_err(|e| ValidationError::Unreadable(candidate.to_path_buf(), e.to_string()))?;
        let canonical_root = root
            .canonicalize()
            .map_err(|e| ValidationError::Unreadable(root.to_path_buf(), e.to_string()))?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(ValidationError::OutsideRoot {
                path: candidate.to_path_buf(),
                root: root.to_path_buf(),
            });
        }

        Ok(())
    }
}

/// Image file scanner
#[derive(Clone)]
pub struct FileScanner {
    extensions: Vec<String>,
    ignore_names: Vec<String>,
    validator: Arc<dyn PathValidator>,
}

impl FileScanner {
    /// Scanner for the given lower-case extensions (no leading dot)
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git.
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "node_modules".to_string(),
            ],
            validator: Arc::new(WithinRoot),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.extensions.clone())
    }

    /// Replace the admission check
    pub fn with_validator(mut self, validator: Arc<dyn PathValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Eligible files under `root_path`, in file-name order per directory
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        // filter_entry needs mutable state, so traversal stays sequential
        let mut symlink_visited = HashSet::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() || !self.is_eligible(entry.path()) {
                continue;
            }

            match self.validator.admit(entry.path(), root_path) {
                Ok(()) => files.push(entry.path().to_path_buf()),
                Err(e) => tracing::warn!(path = %entry.path().display(), "Skipping path: {}", e),
            }
        }

        tracing::debug!(
            root = %root_path.display(),
            files = files.len(),
            "Scan complete"
        );

        Ok(files)
    }

    /// Scan several roots; a root that cannot be scanned is logged and skipped
    pub fn scan_all(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in roots {
            match self.scan(root) {
                Ok(mut found) => files.append(&mut found),
                Err(e) => tracing::warn!("Skipping source directory: {}", e),
            }
        }
        files
    }

    /// Whether the extension is in the allow-list (case-insensitive)
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        // Never filter out the root itself
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();
        if self.ignore_names.iter().any(|name| *name == file_name) {
            return false;
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
