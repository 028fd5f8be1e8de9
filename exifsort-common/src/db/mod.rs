//! Database bootstrap for the metadata cache

pub mod init;

pub use init::{create_file_metadata_table, ensure_writable, init_database};
