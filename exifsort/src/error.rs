//! Error types for exifsort
//!
//! Each operation boundary has its own closed error enum. Only [`SetupError`],
//! store failures on open, and invalid top-level arguments stop a run; the
//! per-item kinds are logged and the item is skipped.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Extractor preflight failure (fatal, raised before any work)
#[derive(Debug, Error)]
pub enum SetupError {
    /// Executable could not be found
    #[error("ExifTool not found at '{0}'. Please install it to use this tool. https://exiftool.org/install.html")]
    NotFound(PathBuf),

    /// Executable ran but the version probe failed
    #[error("Error occurred while checking ExifTool '{command}': {detail}")]
    ProbeFailed { command: PathBuf, detail: String },

    /// Executable could not be started for another reason
    #[error("Failed to start ExifTool '{command}': {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-file extraction failure (recoverable)
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Extractor executable or the input file is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Extractor exceeded its wall-clock budget
    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    /// Extractor exited unsuccessfully
    #[error("Extractor exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Anything else (spawn failure, unreadable output)
    #[error("Unexpected extraction error: {0}")]
    Unexpected(String),
}

/// Path rejected by the validation collaborator (skipped with a warning)
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Path does not exist
    #[error("Path not found: {0}")]
    Missing(PathBuf),

    /// Path resolves outside the allowed root
    #[error("Path {path} is outside allowed root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Path could not be resolved
    #[error("Cannot resolve {0}: {1}")]
    Unreadable(PathBuf, String),
}

/// Embedded JSON that could not be interpreted (file contributes no model)
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of resources")]
    NotAnArray,
}

/// Top-level failure of an ingestion, relocation or aggregation run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Store error: {0}")]
    Store(#[from] exifsort_common::Error),

    /// Caller-supplied arguments that make the whole run meaningless
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for top-level runs
pub type RunResult<T> = Result<T, RunError>;
