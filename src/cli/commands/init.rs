//! # Init Command Module
//!
//! This module implements the `init` command, which writes a starter
//! `ClusterRunner.toml`. Interactively it asks for the cluster nodes and the
//! transport; with `--non-interactive` it writes the commented template.

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use std::{fs, path::PathBuf};

use crate::core::config::{RunnerConfig, Transport};
use crate::infra::t;

/// Arguments of the `init` command.
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub output: PathBuf,
    pub force: bool,
    pub non_interactive: bool,
}

pub const DEFAULT_CONFIG: &str = r#"# Cluster Runner configuration

# Language for console messages ("en" or "zh-CN")
language = "en"

# Root of the test tree and the prefix test files must carry
test_root = "tests"
file_prefix = "test_"

# Paths below test_root to skip
excluded = []

# Concurrent workers for shareable tests (default: half the CPUs plus one)
# concurrency = 4

# Per-test timeout in seconds
timeout_secs = 1800

# Shared volumes are named "<resource_prefix>-<config>"
resource_prefix = "shared"

[cluster]
nodes = ["server1.example.com", "server2.example.com", "server3.example.com"]
# user = "root"
transport = "ssh"
ssh_options = ["-o", "StrictHostKeyChecking=no"]

# Commands that provision and remove the shared resource of a configuration.
# Placeholders: {resource}, {config}, {nodes}
[brackets]
# setup = "./provision.sh {config} {resource} {nodes}"
# teardown = "./cleanup.sh {resource}"
"#;

/// Executes the init command.
pub fn execute(args: InitArgs, locale: &str) -> Result<()> {
    let output = &args.output;
    if output.exists() && !args.force {
        println!(
            "{}",
            t!("init.file_exists", locale = locale, path = output.display()).red()
        );
        println!("{}", t!("init.use_force", locale = locale).yellow());
        return Ok(());
    }

    let content = if args.non_interactive {
        DEFAULT_CONFIG.to_string()
    } else {
        let config = prompt_config(locale)?;
        toml::to_string_pretty(&config).context("Failed to serialize runner config")?
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!(
                "init.create_parent_dir_failed",
                locale = locale,
                path = parent.display()
            )
            .to_string()
        })?;
    }

    fs::write(output, content).with_context(|| {
        t!("init.write_failed", locale = locale, path = output.display()).to_string()
    })?;

    println!(
        "{}",
        t!("init.success", locale = locale, path = output.display()).green()
    );
    println!("{}", t!("init.next_steps", locale = locale));
    Ok(())
}

fn prompt_config(locale: &str) -> Result<RunnerConfig> {
    let theme = ColorfulTheme::default();
    let mut config = RunnerConfig {
        language: locale.to_string(),
        ..RunnerConfig::default()
    };

    let nodes: String = Input::with_theme(&theme)
        .with_prompt(t!("init.prompt_nodes", locale = locale).to_string())
        .interact_text()?;
    config.cluster.nodes = nodes
        .split([',', ' '])
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(str::to_string)
        .collect();

    let transports = ["ssh", "local"];
    let selection = Select::with_theme(&theme)
        .with_prompt(t!("init.prompt_transport", locale = locale).to_string())
        .items(&transports[..])
        .default(0)
        .interact()?;
    config.cluster.transport = if selection == 0 {
        Transport::Ssh
    } else {
        Transport::Local
    };

    let test_root: String = Input::with_theme(&theme)
        .with_prompt(t!("init.prompt_test_root", locale = locale).to_string())
        .default(config.test_root.display().to_string())
        .interact_text()?;
    config.test_root = PathBuf::from(test_root);

    Ok(config)
}
