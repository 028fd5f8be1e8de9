//! ExifTool invoker
//!
//! Runs the external extractor as `<command> <file>` and returns its standard
//! output. Every invocation is bounded by a wall-clock timeout; the child is
//! killed when the timeout fires.
//!
//! # Requirements
//! - `exiftool` on PATH, next to the exifsort binary, or configured explicitly
//! - Answers `exiftool -ver` (checked once by [`ExifTool::probe`])

use super::MetadataExtractor;
use crate::error::{ExtractionError, SetupError};
use async_trait::async_trait;
use exifsort_common::AppConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// ExifTool-backed metadata extractor
#[derive(Debug, Clone)]
pub struct ExifTool {
    command: PathBuf,
    timeout: Duration,
}

impl ExifTool {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Extractor configured from the resolved application config
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.exiftool.clone(), config.extraction_timeout)
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Verify the executable exists and answers a version probe
    ///
    /// Returns the reported version string.
    pub async fn probe(&self) -> Result<String, SetupError> {
        let run = Command::new(&self.command)
            .arg("-ver")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(SetupError::ProbeFailed {
                    command: self.command.clone(),
                    detail: format!("no answer within {:?}", self.timeout),
                })
            }
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(SetupError::NotFound(self.command.clone()))
            }
            Ok(Err(e)) => {
                return Err(SetupError::Spawn {
                    command: self.command.clone(),
                    source: e,
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(SetupError::ProbeFailed {
                command: self.command.clone(),
                detail: format!("exit status {}", output.status),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(command = %self.command.display(), version = %version, "ExifTool available");
        Ok(version)
    }
}

#[async_trait]
impl MetadataExtractor for ExifTool {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::NotFound(path.display().to_string()));
        }

        debug!(file = %path.display(), "Running extractor");

        let run = Command::new(&self.command)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => return Err(ExtractionError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(ExtractionError::NotFound(self.command.display().to_string()))
            }
            Ok(Err(e)) => {
                return Err(ExtractionError::Unexpected(format!(
                    "Failed to execute {}: {}",
                    self.command.display(),
                    e
                )))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(ExtractionError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
