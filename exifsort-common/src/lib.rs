//! # exifsort common library
//!
//! Shared code for the exifsort crates:
//! - Store-level error type
//! - Configuration loading and resolution
//! - Database bootstrap for the metadata cache

pub mod config;
pub mod db;
pub mod error;

pub use config::{AppConfig, KeyStrategy};
pub use error::{Error, Result};
