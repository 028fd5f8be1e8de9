//! Ingestion pipeline
//!
//! Walks a directory, runs the extractor for every eligible file with at most
//! `workers` invocations in flight, normalizes the output and upserts it into
//! the cache in batches of `batch_size`.
//!
//! Failures are isolated per file: an extraction error or an unreadable
//! modification time drops that file from its batch, and a failed batch flush
//! is logged without stopping the run.

use crate::db::MetadataStore;
use crate::error::{RunError, RunResult};
use crate::extractors::MetadataExtractor;
use crate::services::file_scanner::FileScanner;
use crate::types::MetadataRecord;
use exifsort_common::{AppConfig, KeyStrategy};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Eligible files found
    pub discovered: usize,
    /// Files the extractor produced output for
    pub extracted: usize,
    /// Files the extractor failed on
    pub extraction_failed: usize,
    /// Rows written to the cache
    pub stored: usize,
    /// Extracted files that could not be written
    pub store_failed: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.discovered += other.discovered;
        self.extracted += other.extracted;
        self.extraction_failed += other.extraction_failed;
        self.stored += other.stored;
        self.store_failed += other.store_failed;
    }
}

/// Directory-to-cache ingestion
pub struct Ingestor {
    store: MetadataStore,
    scanner: FileScanner,
    workers: usize,
    batch_size: usize,
    key_strategy: KeyStrategy,
}

impl Ingestor {
    pub fn new(store: MetadataStore, config: &AppConfig) -> Self {
        Self {
            store,
            scanner: FileScanner::from_config(config),
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            key_strategy: config.key_strategy,
        }
    }

    pub fn with_scanner(mut self, scanner: FileScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Ingest every eligible file under `root_dir`
    pub async fn ingest(
        &self,
        root_dir: &Path,
        extractor: &dyn MetadataExtractor,
    ) -> RunResult<IngestReport> {
        tracing::info!(root = %root_dir.display(), "Updating database with folder contents");

        let files = self
            .scanner
            .scan(root_dir)
            .map_err(|e| RunError::InvalidArgument(e.to_string()))?;

        tracing::info!("Found {} image files to process", files.len());

        let report = self.ingest_files(files, extractor).await;

        tracing::info!(
            root = %root_dir.display(),
            discovered = report.discovered,
            stored = report.stored,
            extraction_failed = report.extraction_failed,
            store_failed = report.store_failed,
            "Finished updating database"
        );

        Ok(report)
    }

    /// Ingest several directories one after another
    pub async fn ingest_all(
        &self,
        root_dirs: &[PathBuf],
        extractor: &dyn MetadataExtractor,
    ) -> RunResult<IngestReport> {
        if root_dirs.is_empty() {
            return Err(RunError::InvalidArgument(
                "at least one source directory is required".to_string(),
            ));
        }

        let mut total = IngestReport::default();
        for root in root_dirs {
            total.absorb(self.ingest(root, extractor).await?);
        }
        Ok(total)
    }

    /// Extract and store an explicit list of files
    pub async fn ingest_files(
        &self,
        files: Vec<PathBuf>,
        extractor: &dyn MetadataExtractor,
    ) -> IngestReport {
        let total_files = files.len();
        let mut report = IngestReport {
            discovered: total_files,
            ..Default::default()
        };

        let mut results = stream::iter(files)
            .map(|path| async move {
                let result = extractor.extract(&path).await;
                (path, result)
            })
            .buffer_unordered(self.workers);

        let mut buffer: Vec<MetadataRecord> = Vec::with_capacity(self.batch_size);
        let mut processed = 0usize;

        while let Some((path, result)) = results.next().await {
            processed += 1;

            match result {
                Ok(raw) => {
                    report.extracted += 1;
                    match MetadataRecord::from_extraction(&path, &raw, self.key_strategy) {
                        Ok(record) => buffer.push(record),
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Cannot build cache record, skipping file"
                            );
                            report.store_failed += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        extractor = extractor.name(),
                        error = %e,
                        "Error processing file"
                    );
                    report.extraction_failed += 1;
                }
            }

            if buffer.len() >= self.batch_size {
                self.flush(&mut buffer, &mut report).await;
            }

            if processed % 10 == 0 || processed == total_files {
                tracing::info!(progress = format!("{}/{}", processed, total_files), "Processing images");
            }
        }

        self.flush(&mut buffer, &mut report).await;
        report
    }

    async fn flush(&self, buffer: &mut Vec<MetadataRecord>, report: &mut IngestReport) {
        if buffer.is_empty() {
            return;
        }

        match self.store.upsert_batch(buffer).await {
            Ok(outcome) => {
                report.stored += outcome.written;
                report.store_failed += outcome.failed;
            }
            Err(e) => {
                tracing::error!(
                    records = buffer.len(),
                    error = %e,
                    "Failed to write metadata batch"
                );
                report.store_failed += buffer.len();
            }
        }

        buffer.clear();
    }
}
