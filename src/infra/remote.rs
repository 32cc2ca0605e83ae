//! # Remote Execution Module
//!
//! The capability tests use to reach cluster nodes:
//! `execute(node, command) -> {exit_code, stdout, stderr}`. How a command is
//! transported is up to the [`RemoteExecutor`] implementation.

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::process::Command;
use tracing::trace;

use crate::core::config::{ClusterConfig, Transport};
use crate::infra::command::spawn_and_capture;

/// Structured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes shell commands on cluster nodes.
pub trait RemoteExecutor: Send + Sync {
    fn execute<'a>(&'a self, node: &'a str, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Runs commands through the system `ssh` client in batch mode.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    user: Option<String>,
    options: Vec<String>,
}

impl SshExecutor {
    pub fn new(user: Option<String>, options: Vec<String>) -> Self {
        Self { user, options }
    }

    fn destination(&self, node: &str) -> String {
        match &self.user {
            Some(user) => format!("{user}@{node}"),
            None => node.to_string(),
        }
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute<'a>(&'a self, node: &'a str, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        async move {
            trace!(node, command, "ssh");
            let mut cmd = Command::new("ssh");
            cmd.arg("-o")
                .arg("BatchMode=yes")
                .args(&self.options)
                .arg(self.destination(node))
                .arg(command);
            spawn_and_capture(cmd).await
        }
        .boxed()
    }
}

/// Runs every command on the local host with `sh -c`, ignoring the node.
///
/// Meant for single-host development clusters and for exercising test trees
/// without a cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl RemoteExecutor for LocalExecutor {
    fn execute<'a>(&'a self, node: &'a str, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        async move {
            trace!(node, command, "local");
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            spawn_and_capture(cmd).await
        }
        .boxed()
    }
}

/// Builds the executor selected by the cluster configuration.
pub fn build_executor(cluster: &ClusterConfig) -> Arc<dyn RemoteExecutor> {
    match cluster.transport {
        Transport::Ssh => Arc::new(SshExecutor::new(
            cluster.user.clone(),
            cluster.ssh_options.clone(),
        )),
        Transport::Local => Arc::new(LocalExecutor),
    }
}
