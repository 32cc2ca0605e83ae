//! # Built-in Executables Module
//!
//! Framework-owned test executables: [`ScriptFactory`] runs discovered test
//! files that have no registered Rust implementation, and
//! [`CommandBracketProvider`] provisions and tears down a configuration's
//! shared resource from configured command templates.

use anyhow::{Result, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::execution::TestContext;
use crate::core::models::{Configuration, TestDescriptor};
use crate::core::registry::{BracketKind, BracketProvider, TestCase, TestFactory};

/// Runs a test file with `sh` on the primary node.
///
/// The file must be reachable under the same path on that node. The shared
/// resource, configuration and node list are exported as `CR_RESOURCE`,
/// `CR_CONFIG` and `CR_NODES`.
#[derive(Debug, Clone, Default)]
pub struct ScriptFactory;

impl TestFactory for ScriptFactory {
    fn create(&self, descriptor: &TestDescriptor) -> Box<dyn TestCase> {
        Box::new(ScriptCase {
            path: descriptor.module_path.clone(),
        })
    }
}

struct ScriptCase {
    path: PathBuf,
}

impl ScriptCase {
    fn command(&self, ctx: &TestContext) -> Result<String> {
        let path = self.path.to_string_lossy();
        let env = [
            ("CR_RESOURCE", ctx.resource().unwrap_or_default().to_string()),
            ("CR_CONFIG", ctx.configuration().token().to_string()),
            ("CR_NODES", ctx.nodes().join(" ")),
        ];
        let mut parts = Vec::with_capacity(env.len() + 2);
        for (name, value) in &env {
            parts.push(format!("{}={}", name, shlex::try_quote(value)?));
        }
        parts.push("sh".to_string());
        parts.push(shlex::try_quote(&path)?.into_owned());
        Ok(parts.join(" "))
    }
}

impl TestCase for ScriptCase {
    fn run<'a>(&'a mut self, ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        async move {
            let command = self.command(ctx)?;
            let node = ctx.primary_node()?;
            ctx.execute_checked(node, &command).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Bracket executables driven by shell command templates.
///
/// Templates may use `{resource}`, `{config}` and `{nodes}`. A missing
/// template makes that bracket a no-op, which suits clusters whose shared
/// resources are provisioned out of band.
#[derive(Debug, Clone, Default)]
pub struct CommandBracketProvider {
    pub setup: Option<String>,
    pub teardown: Option<String>,
}

impl CommandBracketProvider {
    pub fn new(setup: Option<String>, teardown: Option<String>) -> Self {
        Self { setup, teardown }
    }
}

impl BracketProvider for CommandBracketProvider {
    fn factory(&self, _configuration: Configuration, kind: BracketKind) -> Arc<dyn TestFactory> {
        let template = match kind {
            BracketKind::Setup => self.setup.clone(),
            BracketKind::Teardown => self.teardown.clone(),
        };
        Arc::new(CommandBracket { template })
    }
}

struct CommandBracket {
    template: Option<String>,
}

impl TestFactory for CommandBracket {
    fn create(&self, _descriptor: &TestDescriptor) -> Box<dyn TestCase> {
        Box::new(CommandBracketCase {
            template: self.template.clone(),
        })
    }
}

struct CommandBracketCase {
    template: Option<String>,
}

impl TestCase for CommandBracketCase {
    fn run<'a>(&'a mut self, ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        async move {
            let Some(template) = self.template.as_deref() else {
                ctx.log("no bracket command configured");
                return Ok(());
            };
            let command = render_template(template, ctx);
            if command.trim().is_empty() {
                bail!("bracket command template rendered to an empty command");
            }
            let node = ctx.primary_node()?;
            ctx.execute_checked(node, &command).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Substitutes the bracket placeholders in `template`.
pub fn render_template(template: &str, ctx: &TestContext) -> String {
    template
        .replace("{resource}", ctx.resource().unwrap_or_default())
        .replace("{config}", ctx.configuration().token())
        .replace("{nodes}", &ctx.nodes().join(" "))
}
