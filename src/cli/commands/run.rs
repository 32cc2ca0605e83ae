//! # Run Command Module
//!
//! This module implements the `run` command: classify the test tree, run the
//! plan against the cluster and report the aggregated results.

use anyhow::{Context, Result, bail};
use colored::*;
use std::{fs, path::PathBuf, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    cli::commands::{
        CommonArgs, classify_tree, default_registry, discovery_request, load_runner_config,
    },
    core::{
        aggregator::Aggregator,
        config::RunnerConfig,
        execution::ExecutionEnv,
        registry::TestRegistry,
        scheduler::Scheduler,
    },
    infra::{remote::build_executor, t},
    reporting::{print_failure_details, print_summary, write_json_report},
};

/// Arguments of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub common: CommonArgs,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Executes the run command with the script-based default registry.
pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_run_config(&args)?;
    let registry = default_registry(&config);
    execute_with_registry(args, config, registry).await
}

/// Loads the runner config and applies the run-specific overrides.
pub fn load_run_config(args: &RunArgs) -> Result<RunnerConfig> {
    let mut config = load_runner_config(&args.common)?;
    if let Some(jobs) = args.jobs {
        config.concurrency = Some(jobs);
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Runs the whole pipeline with a caller-provided registry.
pub async fn execute_with_registry(
    args: RunArgs,
    config: RunnerConfig,
    registry: TestRegistry,
) -> Result<()> {
    let locale_name = crate::resolve_locale(&config.language);
    let locale = locale_name.as_str();
    rust_i18n::set_locale(locale);

    println!(
        "{}",
        t!("loading_tests", locale = locale, path = config.test_root.display())
    );

    let request = discovery_request(&config, args.common.single_test.as_deref())?;
    let plan = classify_tree(&request, &registry)?;

    println!(
        "{}",
        t!(
            "plan_summary",
            locale = locale,
            exclusive = plan.exclusive_tests().len(),
            shareable = plan.shareable_count(),
            groups = plan.shareable_groups().len(),
            brackets = plan.brackets().len()
        )
        .cyan()
    );

    if plan.is_empty() {
        println!("{}", t!("no_tests_to_run", locale = locale).green());
        return Ok(());
    }

    fs::create_dir_all(&config.log_dir).with_context(|| {
        t!("log_dir_create_failed", locale = locale, path = config.log_dir.display()).to_string()
    })?;
    println!(
        "{}",
        t!("log_dir_in_use", locale = locale, path = config.log_dir.display())
    );

    let env = ExecutionEnv::new(build_executor(&config.cluster), config.log_dir.clone())
        .with_nodes(config.cluster.nodes.clone())
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_resource_prefix(config.resource_prefix.clone());

    let stop_token = setup_signal_handler(locale);
    let scheduler = Scheduler::new(env, config.concurrency_limit()).with_cancellation(stop_token);
    println!(
        "{}",
        t!("running_with_workers", locale = locale, jobs = scheduler.concurrency_limit()).bold()
    );

    let report = Aggregator::collect(scheduler.run(plan))
        .await
        .with_context(|| t!("run_aborted", locale = locale).to_string())?;

    print_summary(&report, locale);

    if let Some(report_path) = &args.json {
        println!(
            "\n{}",
            t!("writing_json_report", locale = locale, path = report_path.display())
        );
        if let Err(e) = write_json_report(&report, report_path) {
            eprintln!("{} {:#}", t!("json_report_failed", locale = locale).red(), e);
        }
    }

    if report.is_success() {
        println!("\n{}", t!("all_tests_passed", locale = locale).green().bold());
        Ok(())
    } else {
        print_failure_details(&report, locale);
        bail!(t!("tests_failed", locale = locale, count = report.failed()).to_string());
    }
}

/// Sets up a Ctrl-C handler that stops scheduling new tests.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        println!("\n{}", t!("shutdown_signal", locale = locale.as_str()).yellow());
        token_clone.cancel();
    });

    token
}
