//! exifsort - main entry point
//!
//! Command-line front end for the image metadata cache:
//! - `update`: extract and cache metadata for directories of images
//! - `search`: move images whose cached metadata matches a key/value pair
//! - `models`: write a report grouping images by generator model
//! - `history`: list remembered directories (usable as `@N`)

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use exifsort::extractors::ExifTool;
use exifsort::services::path_history::HISTORY_FILE;
use exifsort::services::{
    build_model_index, default_report_path, FileScanner, Ingestor, PathHistory, Relocator,
    SearchCriteria, SearchMode,
};
use exifsort::MetadataStore;
use exifsort_common::config::ConfigOverrides;
use exifsort_common::{AppConfig, KeyStrategy};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Command-line arguments for exifsort
#[derive(Parser, Debug)]
#[command(name = "exifsort")]
#[command(about = "Cache image metadata and sort images by it")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "EXIFSORT_CONFIG")]
    config: Option<PathBuf>,

    /// Metadata cache database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// ExifTool executable
    #[arg(long, global = true)]
    exiftool: Option<PathBuf>,

    /// Per-file extraction timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Concurrent extractions / lookups
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Records per database batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Record key: file-name or path-hash
    #[arg(long, global = true, value_parser = parse_key_strategy)]
    key_strategy: Option<KeyStrategy>,

    /// Log level for the diagnostic log (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Diagnostic log file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract metadata for every image under the given directories
    Update {
        /// Directories to scan (`@N` picks a history entry)
        #[arg(required = true)]
        dirs: Vec<String>,
    },

    /// Move images whose cached metadata contains a key and value
    Search {
        /// Directories to search (`@N` picks a history entry)
        #[arg(long = "source", required = true)]
        sources: Vec<String>,

        /// Directory matching images are moved into
        #[arg(long)]
        target: String,

        /// Metadata key to look for
        #[arg(long, default_value = "parameters")]
        key: String,

        /// Value to look for (case-sensitive)
        #[arg(long)]
        value: String,

        /// prompt (1): prompt section only; full (2): prompt and negative prompt
        #[arg(long, default_value = "prompt", value_parser = parse_search_mode)]
        mode: SearchMode,
    },

    /// Group images by generator model and write a report
    Models {
        /// Directory to report on (`@N` picks a history entry)
        dir: String,

        /// Report file (default: <date>_<time>.<dir name>.txt)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List remembered directories
    History,
}

fn parse_key_strategy(s: &str) -> std::result::Result<KeyStrategy, String> {
    s.parse().map_err(|e: exifsort_common::Error| e.to_string())
}

fn parse_search_mode(s: &str) -> std::result::Result<SearchMode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_file: args.config.clone(),
        database_path: args.database.clone(),
        exiftool_path: args.exiftool.clone(),
        extraction_timeout_secs: args.timeout_secs,
        workers: args.workers,
        batch_size: args.batch_size,
        key_strategy: args.key_strategy,
        log_level: args.log_level.clone(),
        log_file: args.log_file.clone(),
    };
    let config = AppConfig::resolve(&overrides).context("Failed to load configuration")?;

    init_tracing(&config);

    info!("Starting exifsort v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let history_path = config.data_dir.join(HISTORY_FILE);
    let mut history = PathHistory::load(&history_path);

    match args.command {
        Command::Update { dirs } => {
            let dirs = resolve_dirs(&dirs, &mut history)?;
            save_history(&history, &history_path);
            run_update(&config, &dirs).await
        }
        Command::Search {
            sources,
            target,
            key,
            value,
            mode,
        } => {
            let sources = resolve_dirs(&sources, &mut history)?;
            let target = resolve_dirs(&[target], &mut history)?.remove(0);
            save_history(&history, &history_path);
            run_search(&config, &sources, &target, &key, &value, mode).await
        }
        Command::Models { dir, output } => {
            let dir = resolve_dirs(&[dir], &mut history)?.remove(0);
            save_history(&history, &history_path);
            run_models(&config, &dir, output).await
        }
        Command::History => {
            if history.is_empty() {
                println!("History is empty.");
            }
            for (i, path) in history.entries().iter().enumerate() {
                println!("@{}: {}", i + 1, path.display());
            }
            Ok(())
        }
    }
}

async fn run_update(config: &AppConfig, dirs: &[PathBuf]) -> Result<()> {
    let exiftool = preflight(config).await?;

    exifsort_common::db::ensure_writable(&config.database_path)
        .context("Database location is not writable")?;
    let store = MetadataStore::open(config)
        .await
        .context("Failed to open metadata database")?;
    let ingestor = Ingestor::new(store.clone(), config);

    let mut stored = 0;
    let mut failed = 0;
    for dir in dirs {
        println!("Updating database with contents of {}", dir.display());
        let report = ingestor.ingest(dir, &exiftool).await?;
        println!(
            "  {} files found, {} stored, {} failed",
            report.discovered,
            report.stored,
            report.extraction_failed + report.store_failed
        );
        stored += report.stored;
        failed += report.extraction_failed + report.store_failed;
    }

    println!(
        "Database update complete: {} files stored, {} failed ({} cached in total)",
        stored,
        failed,
        store.count().await?
    );
    println!("Database location: {}", config.database_path.display());
    Ok(())
}

async fn run_search(
    config: &AppConfig,
    sources: &[PathBuf],
    target: &Path,
    key: &str,
    value: &str,
    mode: SearchMode,
) -> Result<()> {
    preflight(config).await?;

    let store = MetadataStore::open(config)
        .await
        .context("Failed to open metadata database")?;
    let relocator = Relocator::new(store, config);
    let criteria = SearchCriteria::new(key, value);

    let report = relocator
        .search_and_move(sources, target, &criteria, mode, config.batch_size)
        .await?;

    println!("Search complete. Processed {} files.", report.processed);
    println!("Moved {} files to {}", report.moved, target.display());
    if report.skipped + report.failed > 0 {
        println!(
            "{} files skipped, {} failed (see log for details)",
            report.skipped, report.failed
        );
    }
    Ok(())
}

async fn run_models(config: &AppConfig, dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let store = MetadataStore::open(config)
        .await
        .context("Failed to open metadata database")?;
    let scanner = FileScanner::from_config(config);

    println!("Searching for models...");
    let index = build_model_index(&store, &scanner, dir, config.workers).await?;
    println!(
        "Found {} unique models across {} files.",
        index.len(),
        index.total_files()
    );

    let output = match output {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().context("Cannot determine current directory")?;
            default_report_path(&cwd, dir, chrono::Local::now())
        }
    };

    index
        .save_report(&output)
        .with_context(|| format!("Error saving results to {}", output.display()))?;
    println!("Results saved to {}", output.display());
    Ok(())
}

/// Probe the extractor before any work starts
async fn preflight(config: &AppConfig) -> Result<ExifTool> {
    let exiftool = ExifTool::from_config(config);
    let version = exiftool.probe().await?;
    info!(command = %exiftool.command().display(), version = %version, "ExifTool found");
    Ok(exiftool)
}

/// Expand `@N` references, require existing directories, and record them
fn resolve_dirs(args: &[String], history: &mut PathHistory) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::with_capacity(args.len());
    for arg in args {
        let Some(path) = history.resolve(arg) else {
            bail!("Invalid history index: {}", arg);
        };
        if !path.is_dir() {
            bail!("Not a directory: {}", path.display());
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("Cannot resolve {}", path.display()))?;
        dirs.push(path);
    }

    // Recorded after resolving, so @N refers to the history as listed
    for dir in &dirs {
        history.add(dir.clone());
    }
    Ok(dirs)
}

fn save_history(history: &PathHistory, path: &Path) {
    if let Err(e) = history.save(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to save path history");
    }
}

/// Diagnostic log file at the configured level plus WARN and above on stderr
fn init_tracing(config: &AppConfig) {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "exifsort={level},exifsort_common={level}",
                level = config.log_level
            ))
        })
    };

    let file_layer = config.log_file.as_ref().and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()),
            ),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
}
