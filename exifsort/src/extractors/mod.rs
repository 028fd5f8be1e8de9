//! Metadata extractors
//!
//! The pipelines only depend on [`MetadataExtractor`]; [`exiftool::ExifTool`]
//! is the production implementation.

pub mod exiftool;

pub use exiftool::ExifTool;

use crate::error::ExtractionError;
use async_trait::async_trait;
use std::path::Path;

/// Source of raw metadata text for one file
///
/// Implementations must be safe to call concurrently; the ingestion pipeline
/// keeps up to `workers` calls in flight.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &'static str;

    /// Return the raw metadata blob for `path`
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}
