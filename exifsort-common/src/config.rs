//! Configuration loading and resolution
//!
//! One [`AppConfig`] is resolved at startup and handed to every component.
//! Each field is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Directory name used under the platform config and data folders
pub const APP_DIR_NAME: &str = "exifsort";

/// Cache file name, kept from earlier releases so existing caches are picked up
pub const DEFAULT_DATABASE_FILE: &str = "statistics_image_metadata.db";

pub const ENV_CONFIG: &str = "EXIFSORT_CONFIG";
pub const ENV_DATABASE: &str = "EXIFSORT_DATABASE";
pub const ENV_EXIFTOOL: &str = "EXIFSORT_EXIFTOOL";
pub const ENV_TIMEOUT_SECS: &str = "EXIFSORT_TIMEOUT_SECS";
pub const ENV_WORKERS: &str = "EXIFSORT_WORKERS";
pub const ENV_BATCH_SIZE: &str = "EXIFSORT_BATCH_SIZE";
pub const ENV_KEY_STRATEGY: &str = "EXIFSORT_KEY_STRATEGY";

/// How the unique record key of a cached file is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Base file name. Compatible with existing caches, but two files with
    /// the same name in different folders share one record.
    #[default]
    FileName,
    /// SHA-256 of the canonical full path
    PathHash,
}

impl FromStr for KeyStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file-name" | "filename" | "name" => Ok(KeyStrategy::FileName),
            "path-hash" | "pathhash" | "hash" => Ok(KeyStrategy::PathHash),
            other => Err(Error::Config(format!(
                "Unknown key strategy '{}' (expected 'file-name' or 'path-hash')",
                other
            ))),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::FileName => write!(f, "file-name"),
            KeyStrategy::PathHash => write!(f, "path-hash"),
        }
    }
}

/// Configuration file contents
///
/// Every field is optional; anything left out falls through to the
/// compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Explicit path or name of the metadata extraction executable
    #[serde(default)]
    pub exiftool_path: Option<PathBuf>,

    #[serde(default)]
    pub extraction_timeout_secs: Option<u64>,

    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Eligible image extensions, with or without the leading dot
    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    #[serde(default)]
    pub key_strategy: Option<KeyStrategy>,

    #[serde(default)]
    pub max_lock_wait_ms: Option<u64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,

    /// Diagnostic log file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Built-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub exiftool: PathBuf,
    pub extraction_timeout_secs: u64,
    pub workers: usize,
    pub batch_size: usize,
    pub extensions: Vec<String>,
    pub key_strategy: KeyStrategy,
    pub max_lock_wait_ms: u64,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILE),
            exiftool: default_exiftool_command(),
            extraction_timeout_secs: 30,
            workers: 24,
            batch_size: 100,
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            key_strategy: KeyStrategy::FileName,
            max_lock_wait_ms: 5000,
            log_level: "info".to_string(),
            log_file: data_dir.join("exifsort.log"),
            data_dir,
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub exiftool_path: Option<PathBuf>,
    pub extraction_timeout_secs: Option<u64>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub key_strategy: Option<KeyStrategy>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Fully resolved process-wide configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub exiftool: PathBuf,
    pub extraction_timeout: Duration,
    pub workers: usize,
    pub batch_size: usize,
    /// Lower-case extensions without the leading dot
    pub extensions: Vec<String>,
    pub key_strategy: KeyStrategy,
    pub max_lock_wait_ms: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_parts(CompiledDefaults::for_current_platform(), TomlConfig::default())
    }
}

impl AppConfig {
    /// Resolve configuration from overrides, environment, TOML and defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let explicit_file = overrides
            .config_file
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
        let toml_config = match &explicit_file {
            Some(path) => load_toml_config(path, true)?,
            None => match default_config_file() {
                Some(path) => load_toml_config(&path, false)?,
                None => None,
            },
        }
        .unwrap_or_default();

        let mut config = Self::from_parts(defaults, toml_config);

        // Priority 2: environment
        if let Some(path) = env_var(ENV_DATABASE) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = env_var(ENV_EXIFTOOL) {
            config.exiftool = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>(ENV_TIMEOUT_SECS)? {
            config.extraction_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = env_parse::<usize>(ENV_WORKERS)? {
            config.workers = workers;
        }
        if let Some(batch) = env_parse::<usize>(ENV_BATCH_SIZE)? {
            config.batch_size = batch;
        }
        if let Some(strategy) = env_var(ENV_KEY_STRATEGY) {
            config.key_strategy = strategy.parse()?;
        }

        // Priority 1: command line
        if let Some(path) = &overrides.database_path {
            config.database_path = path.clone();
        }
        if let Some(path) = &overrides.exiftool_path {
            config.exiftool = path.clone();
        }
        if let Some(secs) = overrides.extraction_timeout_secs {
            config.extraction_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = overrides.workers {
            config.workers = workers;
        }
        if let Some(batch) = overrides.batch_size {
            config.batch_size = batch;
        }
        if let Some(strategy) = overrides.key_strategy {
            config.key_strategy = strategy;
        }
        if let Some(level) = &overrides.log_level {
            config.log_level = level.clone();
        }
        if let Some(file) = &overrides.log_file {
            config.log_file = Some(file.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Merge a TOML file over the compiled defaults
    pub fn from_parts(defaults: CompiledDefaults, toml: TomlConfig) -> Self {
        let extensions = toml
            .extensions
            .map(|exts| normalize_extensions(&exts))
            .unwrap_or(defaults.extensions);

        Self {
            data_dir: defaults.data_dir,
            database_path: toml.database_path.unwrap_or(defaults.database_path),
            exiftool: toml.exiftool_path.unwrap_or(defaults.exiftool),
            extraction_timeout: Duration::from_secs(
                toml.extraction_timeout_secs
                    .unwrap_or(defaults.extraction_timeout_secs),
            ),
            workers: toml.workers.unwrap_or(defaults.workers),
            batch_size: toml.batch_size.unwrap_or(defaults.batch_size),
            extensions,
            key_strategy: toml.key_strategy.unwrap_or(defaults.key_strategy),
            max_lock_wait_ms: toml.max_lock_wait_ms.unwrap_or(defaults.max_lock_wait_ms),
            log_level: toml.logging.level.unwrap_or(defaults.log_level),
            log_file: Some(toml.logging.file.unwrap_or(defaults.log_file)),
        }
    }

    /// Reject settings that would stall or disable the pipelines
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.extraction_timeout.is_zero() {
            return Err(Error::Config(
                "extraction timeout must be at least 1 second".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config(
                "at least one image extension must be configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a TOML config file
///
/// A missing file yields `Ok(None)`; it is only worth a warning when the
/// caller pointed at it explicitly. A file that exists but does not parse
/// is an error.
pub fn load_toml_config(path: &Path, explicit: bool) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        if explicit {
            warn!("Config file not found: {}, using defaults", path.display());
        } else {
            debug!("No config file at {}", path.display());
        }
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    debug!("Loaded config file: {}", path.display());
    Ok(Some(config))
}

/// Strip leading dots and lower-case extension entries
pub fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// `<config dir>/exifsort/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./exifsort_data"))
}

/// Prefer an extractor shipped next to our own executable, else rely on PATH
fn default_exiftool_command() -> PathBuf {
    let name = if cfg!(target_os = "windows") {
        "exiftool.exe"
    } else {
        "exiftool"
    };

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let local = dir.join(name);
            if local.is_file() {
                return local;
            }
        }
    }

    PathBuf::from(name)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, raw))),
        None => Ok(None),
    }
}
