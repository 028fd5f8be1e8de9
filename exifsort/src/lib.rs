//! exifsort library interface
//!
//! Image metadata cache: ingestion of extracted metadata into a keyed SQLite
//! store, metadata search with file relocation, and model aggregation.

pub mod db;
pub mod error;
pub mod extractors;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::db::MetadataStore;
pub use crate::error::{RunError, RunResult};
pub use crate::extractors::{ExifTool, MetadataExtractor};
