//! # Command Execution Module
//!
//! Spawns processes and captures their output for the remote execution layer.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

use crate::infra::remote::CommandOutput;

/// Spawns a command, waits for it and captures stdout and stderr separately.
///
/// The child is killed if the returned future is dropped, so a timed-out test
/// does not leave its command running.
pub async fn spawn_and_capture(mut cmd: Command) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to spawn '{program}'"))?;

    Ok(CommandOutput {
        // A missing code means the process was killed by a signal.
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
