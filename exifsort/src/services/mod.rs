//! Pipelines and supporting services

pub mod file_scanner;
pub mod ingest;
pub mod model_index;
pub mod normalizer;
pub mod path_history;
pub mod relocator;

pub use file_scanner::{FileScanner, PathValidator, ScanError, WithinRoot};
pub use ingest::{IngestReport, Ingestor};
pub use model_index::{build_model_index, default_report_path, extract_model_name, ModelIndex};
pub use path_history::PathHistory;
pub use relocator::{RelocationReport, Relocator, SearchCriteria, SearchMode};
