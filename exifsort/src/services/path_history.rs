//! Recently used directories
//!
//! A short most-recent-first list of directories the operator has passed to
//! the CLI. Entries can be referred to as `@N` (1-based) on later runs.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_HISTORY: usize = 10;
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHistory {
    #[serde(default)]
    entries: Vec<PathBuf>,
    #[serde(skip, default = "default_max")]
    max_entries: usize,
}

fn default_max() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for PathHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }
}

impl PathHistory {
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Put `path` at the front, dropping an older copy and the oldest entry
    /// beyond capacity
    pub fn add(&mut self, path: PathBuf) {
        self.entries.retain(|p| *p != path);
        self.entries.insert(0, path);
        self.entries.truncate(self.max_entries);
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Entry by 1-based position
    pub fn get(&self, position: usize) -> Option<&Path> {
        position
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Expand an `@N` reference; any other argument is returned as a path
    ///
    /// Returns `None` for an `@N` with no matching entry.
    pub fn resolve(&self, arg: &str) -> Option<PathBuf> {
        match arg.strip_prefix('@').map(str::parse::<usize>) {
            Some(Ok(position)) => self.get(position).map(Path::to_path_buf),
            Some(Err(_)) | None => Some(PathBuf::from(arg)),
        }
    }

    /// Load from `path`; a missing or unreadable file gives an empty history
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read path history");
                return Self::default();
            }
        };

        match serde_json::from_str::<PathHistory>(&contents) {
            Ok(mut history) => {
                history.entries.truncate(history.max_entries);
                history
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt path history");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}
