//! # Runner Configuration Module
//!
//! The runner is configured from a TOML file (by default
//! `ClusterRunner.toml`). Command-line flags override individual values.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::classifier::DEFAULT_FILE_PREFIX;
use crate::core::execution::{DEFAULT_RESOURCE_PREFIX, DEFAULT_TIMEOUT};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "ClusterRunner.toml";

/// How commands reach cluster nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// The system `ssh` client.
    #[default]
    Ssh,
    /// `sh -c` on the local host.
    Local,
}

/// The cluster the tests run against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Node host names. The first one is the primary node.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Remote user for ssh; the ssh client default when absent.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub transport: Transport,
    /// Extra arguments passed to `ssh` before the destination.
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

/// Command templates that provision and remove a configuration's shared
/// resource. Placeholders: `{resource}`, `{config}`, `{nodes}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketConfig {
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub teardown: Option<String>,
}

/// Represents the entire runner configuration, loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of concurrent workers for shareable tests.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Root of the test tree.
    #[serde(default = "default_test_root")]
    pub test_root: PathBuf,

    /// Test files or directories to skip.
    #[serde(default)]
    pub excluded: Vec<PathBuf>,

    /// Only files whose name starts with this prefix are tests.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Directory that receives one log file per executed descriptor.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Per-descriptor timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Shared resources are named `<resource_prefix>-<config>`.
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub brackets: BracketConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            concurrency: None,
            test_root: default_test_root(),
            excluded: Vec::new(),
            file_prefix: default_file_prefix(),
            log_dir: default_log_dir(),
            timeout_secs: default_timeout_secs(),
            resource_prefix: default_resource_prefix(),
            cluster: ClusterConfig::default(),
            brackets: BracketConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Concurrency limit, defaulting to half the CPUs plus one.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency.unwrap_or_else(|| num_cpus::get() / 2 + 1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        if self.file_prefix.is_empty() {
            bail!("file_prefix must not be empty");
        }
        Ok(())
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_test_root() -> PathBuf {
    PathBuf::from("tests")
}

fn default_file_prefix() -> String {
    DEFAULT_FILE_PREFIX.to_string()
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("cluster-runner")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_resource_prefix() -> String {
    DEFAULT_RESOURCE_PREFIX.to_string()
}

/// Parses a runner configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RunnerConfig> {
    let config: RunnerConfig = toml::from_str(content).context("Failed to parse runner config")?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates the runner configuration at `path`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}
