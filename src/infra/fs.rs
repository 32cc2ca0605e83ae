//! # File System Operations Module
//!
//! Per-test log files and path helpers.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only log file owned by one test execution.
///
/// Write failures are ignored: a full disk must not turn a passing test into
/// a failing one.
#[derive(Debug)]
pub struct TestLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TestLog {
    /// Creates (or truncates) the log file, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create log directory: {}", parent.display())
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open test log: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line.
    pub fn line(&self, message: impl Display) {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "[{timestamp}] {message}");
        }
    }
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
