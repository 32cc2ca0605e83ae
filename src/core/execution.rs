//! # Descriptor Execution Module
//!
//! This module provides the execution wrapper that turns one
//! [`TestDescriptor`] into exactly one [`ResultRecord`]. It builds a fresh
//! [`TestContext`], drives the test's lifecycle under a timeout and converts
//! every error or panic raised by the test into a `Fail` record.

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use colored::*;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{
    core::{
        models::{Configuration, Diagnostic, FailureReason, Nature, ResultRecord, TestDescriptor},
        registry::TestCase,
    },
    infra::{
        fs::TestLog,
        remote::{CommandOutput, RemoteExecutor},
        t,
    },
};

/// Per-descriptor timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default name prefix of the shared resource provisioned per configuration.
pub const DEFAULT_RESOURCE_PREFIX: &str = "shared";

/// Everything the execution wrapper needs that is shared by all descriptors.
#[derive(Clone)]
pub struct ExecutionEnv {
    pub executor: Arc<dyn RemoteExecutor>,
    pub nodes: Arc<Vec<String>>,
    pub log_dir: PathBuf,
    pub resource_prefix: String,
    pub timeout: Duration,
}

impl ExecutionEnv {
    pub fn new(executor: Arc<dyn RemoteExecutor>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            nodes: Arc::new(Vec::new()),
            log_dir: log_dir.into(),
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = Arc::new(nodes);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_prefix = prefix.into();
        self
    }

    /// Name of the shared resource backing `configuration`, if it has one.
    pub fn resource_name(&self, configuration: Configuration) -> Option<String> {
        (!configuration.is_generic())
            .then(|| format!("{}-{}", self.resource_prefix, configuration.token()))
    }
}

/// The per-execution view handed to a [`TestCase`].
pub struct TestContext {
    descriptor: TestDescriptor,
    resource: Option<String>,
    nodes: Arc<Vec<String>>,
    executor: Arc<dyn RemoteExecutor>,
    log: TestLog,
}

impl TestContext {
    pub fn new(descriptor: &TestDescriptor, env: &ExecutionEnv, log: TestLog) -> Self {
        // Exclusive tests build their own resources; only shareable tests and
        // brackets address the configuration's shared one.
        let resource = match descriptor.nature {
            Nature::Exclusive => None,
            Nature::Shareable | Nature::Bracket => env.resource_name(descriptor.configuration),
        };
        Self {
            descriptor: descriptor.clone(),
            resource,
            nodes: env.nodes.clone(),
            executor: env.executor.clone(),
            log,
        }
    }

    pub fn descriptor(&self) -> &TestDescriptor {
        &self.descriptor
    }

    pub fn configuration(&self) -> Configuration {
        self.descriptor.configuration
    }

    /// The shared resource of this descriptor's configuration.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// The node commands are sent to when a test does not pick one.
    pub fn primary_node(&self) -> Result<&str> {
        self.nodes
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("no cluster nodes are configured"))
    }

    pub fn log(&self, message: impl Display) {
        self.log.line(message);
    }

    /// Runs `command` on `node`, recording the command and its output in the
    /// test log.
    pub async fn execute(&self, node: &str, command: &str) -> Result<CommandOutput> {
        self.log.line(format_args!("[{node}] $ {command}"));
        let output = self
            .executor
            .execute(node, command)
            .await
            .with_context(|| format!("Failed to execute '{command}' on {node}"))?;
        self.log.line(format_args!("[{node}] exit code {}", output.exit_code));
        if !output.stdout.trim().is_empty() {
            self.log.line(output.stdout.trim_end());
        }
        if !output.stderr.trim().is_empty() {
            self.log.line(output.stderr.trim_end());
        }
        Ok(output)
    }

    /// Like [`TestContext::execute`], but a non-zero exit code is an error.
    pub async fn execute_checked(&self, node: &str, command: &str) -> Result<CommandOutput> {
        let output = self.execute(node, command).await?;
        if !output.success() {
            bail!(
                "'{}' on {} exited with {}: {}",
                command,
                node,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }
}

/// Executes one descriptor and returns its single result record.
///
/// Never fails: every problem inside the test becomes a `Fail` record.
pub async fn execute_descriptor(descriptor: &TestDescriptor, env: &ExecutionEnv) -> ResultRecord {
    let label = descriptor.label();
    println!("{}", t!("run.running_test", name = &label).blue());

    let started_at = Utc::now();
    let start = Instant::now();
    let log_path = descriptor.log_path(&env.log_dir);

    let failure = match TestLog::create(&log_path) {
        Ok(log) => {
            let ctx = TestContext::new(descriptor, env, log);
            ctx.log(format_args!(
                "{} {} ({})",
                descriptor.nature, label, descriptor.module_key
            ));
            let failure = match instantiate(descriptor) {
                Ok(mut case) => run_lifecycle(case.as_mut(), &ctx, env.timeout).await,
                Err(message) => Some((FailureReason::Panicked, message)),
            };
            match &failure {
                None => ctx.log("PASS"),
                Some((reason, message)) => ctx.log(format_args!("FAIL ({reason:?}): {message}")),
            }
            failure
        }
        Err(e) => Some((FailureReason::SetupFailed, format!("{e:#}"))),
    };

    let elapsed = start.elapsed();
    let finished_at = Utc::now();
    let duration = format!("{:.2}", elapsed.as_secs_f64());

    let (reason, error) = match failure {
        None => {
            println!("{}", t!("run.test_passed", name = &label, duration = &duration).green());
            (None, None)
        }
        Some((reason, message)) => {
            println!("{}", t!("run.test_failed", name = &label, duration = &duration).red());
            debug!(test = %label, ?reason, error = %message, "descriptor failed");
            (Some(reason), Some(message))
        }
    };

    ResultRecord::executed(
        descriptor,
        reason,
        started_at,
        finished_at,
        elapsed,
        Diagnostic {
            log_path: Some(log_path),
            error,
        },
    )
}

fn instantiate(descriptor: &TestDescriptor) -> Result<Box<dyn TestCase>, String> {
    std::panic::catch_unwind(AssertUnwindSafe(|| descriptor.test_class.create(descriptor)))
        .map_err(|panic| format!("test factory panicked: {}", panic_message(panic.as_ref())))
}

type Failure = (FailureReason, String);

/// Runs `setup` and `run` under the timeout, then always `terminate`.
///
/// The first failing step decides the reported reason.
async fn run_lifecycle(
    case: &mut dyn TestCase,
    ctx: &TestContext,
    timeout: Duration,
) -> Option<Failure> {
    let body = tokio::time::timeout(timeout, async {
        guarded(case.setup(ctx))
            .await
            .map_err(|e| e.into_failure(FailureReason::SetupFailed))?;
        guarded(case.run(ctx))
            .await
            .map_err(|e| e.into_failure(FailureReason::TestFailed))
    })
    .await;

    let mut failure = match body {
        Ok(Ok(())) => None,
        Ok(Err(failure)) => Some(failure),
        Err(_) => Some(timed_out(timeout)),
    };

    let terminate = match tokio::time::timeout(timeout, guarded(case.terminate(ctx))).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.into_failure(FailureReason::TerminateFailed)),
        Err(_) => Some(timed_out(timeout)),
    };
    if let Some((reason, message)) = terminate {
        if failure.is_none() {
            failure = Some((reason, message));
        } else {
            warn!(test = %ctx.descriptor().label(), error = %message, "terminate failed after an earlier failure");
            ctx.log(format_args!("terminate also failed: {message}"));
        }
    }
    failure
}

fn timed_out(timeout: Duration) -> Failure {
    (
        FailureReason::Timeout,
        format!("timed out after {}s", timeout.as_secs_f64()),
    )
}

enum StepError {
    Failed(anyhow::Error),
    Panicked(String),
}

impl StepError {
    fn into_failure(self, reason: FailureReason) -> Failure {
        match self {
            StepError::Failed(e) => (reason, format!("{e:#}")),
            StepError::Panicked(message) => (FailureReason::Panicked, message),
        }
    }
}

async fn guarded(step: BoxFuture<'_, Result<()>>) -> Result<(), StepError> {
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StepError::Failed(e)),
        Err(panic) => Err(StepError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}
