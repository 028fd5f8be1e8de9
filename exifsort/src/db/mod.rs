//! Database access for exifsort
//!
//! Schema bootstrap lives in `exifsort_common::db`; this module holds the
//! cache operations used by the pipelines.

pub mod metadata;

pub use metadata::{BatchOutcome, MetadataStore, StoredRecord};
