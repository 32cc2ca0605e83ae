//! # Commands Module
//!
//! Implementations of the CLI commands and the configuration plumbing they
//! share.

pub mod init;
pub mod plan;
pub mod run;

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::core::classifier::{DiscoveryRequest, classify};
use crate::core::config::{RunnerConfig, load_config};
use crate::core::executables::{CommandBracketProvider, ScriptFactory};
use crate::core::planner::RunPlan;
use crate::core::registry::TestRegistry;
use crate::infra::fs::expand_path;
use crate::infra::t;

/// Command-line values shared by `run` and `plan`.
#[derive(Debug, Clone, Default)]
pub struct CommonArgs {
    pub config: PathBuf,
    /// True when `--config` was given, which makes a missing file an error.
    pub config_explicit: bool,
    pub test_root: Option<PathBuf>,
    pub single_test: Option<PathBuf>,
    pub excluded: Vec<PathBuf>,
    pub lang: Option<String>,
}

/// Loads the config file, applies command-line overrides and expands paths.
pub fn load_runner_config(args: &CommonArgs) -> Result<RunnerConfig> {
    let mut config = if args.config_explicit || args.config.exists() {
        load_config(&args.config)?
    } else {
        RunnerConfig::default()
    };

    if let Some(root) = &args.test_root {
        config.test_root = root.clone();
    }
    config.excluded.extend(args.excluded.iter().cloned());
    if let Some(lang) = &args.lang {
        config.language = lang.clone();
    }

    config.test_root = expand_path(&config.test_root)?;
    config.log_dir = expand_path(&config.log_dir)?;
    config.excluded = config
        .excluded
        .iter()
        .map(|path| expand_path(path))
        .collect::<Result<_>>()?;
    Ok(config)
}

/// Builds the discovery request for `config`.
pub fn discovery_request(
    config: &RunnerConfig,
    single_test: Option<&Path>,
) -> Result<DiscoveryRequest> {
    let mut request = DiscoveryRequest::new(config.test_root.clone());
    request.excluded = config.excluded.clone();
    request.file_prefix = config.file_prefix.clone();

    if let Some(single) = single_test {
        let single = expand_path(single)?;
        if !single.is_file() {
            bail!(t!("single_test_not_found", path = single.display()).to_string());
        }
        request.single_file = Some(single);
    } else if !config.test_root.is_dir() {
        bail!(t!("test_root_not_found", path = config.test_root.display()).to_string());
    }
    Ok(request)
}

/// The registry used by the binary: every discovered file runs as a script,
/// and brackets run the configured command templates.
pub fn default_registry(config: &RunnerConfig) -> TestRegistry {
    TestRegistry::new()
        .with_fallback(ScriptFactory)
        .with_brackets(CommandBracketProvider::new(
            config.brackets.setup.clone(),
            config.brackets.teardown.clone(),
        ))
}

/// Classifies the requested tree, naming the root in the error.
pub fn classify_tree(request: &DiscoveryRequest, registry: &TestRegistry) -> Result<RunPlan> {
    classify(request, registry)
        .with_context(|| t!("classification_failed", path = request.root.display()).to_string())
}
