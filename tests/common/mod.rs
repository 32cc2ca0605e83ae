// Shared test helpers for integration tests
#![allow(dead_code)]

use anyhow::{Result, bail};
use cluster_runner::core::execution::{ExecutionEnv, TestContext};
use cluster_runner::core::models::{Configuration, TestDescriptor};
use cluster_runner::core::registry::{
    BracketKind, BracketProvider, TestCase, TestFactory, TestRegistry,
};
use cluster_runner::infra::remote::{CommandOutput, RemoteExecutor};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

/// A temporary test tree.
pub struct TestTree {
    pub dir: TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            dir: tempdir().expect("Failed to create temporary directory"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a test file whose first line is `# <header>`.
    pub fn add(&self, relative: &str, header: &str) -> PathBuf {
        self.write(relative, &format!("# {header}\nexit 0\n"))
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create test directory");
        fs::write(&path, content).expect("Failed to write test file");
        path
    }
}

/// What a recorded test case does when it runs.
#[derive(Debug, Clone)]
pub enum Behavior {
    Pass,
    Fail(&'static str),
    Panic(&'static str),
    FailSetup,
    FailTerminate,
    Sleep(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    End,
}

/// Shared log of every lifecycle a test case went through.
#[derive(Default)]
pub struct Trace {
    events: Mutex<Vec<(String, Event, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    terminated: Mutex<Vec<String>>,
}

impl Trace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn start(&self, label: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push((label.to_string(), Event::Start, Instant::now()));
    }

    fn end(&self, label: &str) {
        self.events
            .lock()
            .unwrap()
            .push((label.to_string(), Event::End, Instant::now()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Labels in the order their run step started.
    pub fn started(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event, _)| *event == Event::Start)
            .map(|(label, _, _)| label.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<(String, Event, Instant)> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }

    /// (start, end) of one label's run step.
    pub fn span(&self, label: &str) -> (Instant, Instant) {
        let events = self.events();
        let find = |kind: Event| {
            events
                .iter()
                .find(|(l, event, _)| l == label && *event == kind)
                .map(|(_, _, at)| *at)
                .unwrap_or_else(|| panic!("no {kind:?} event for {label}"))
        };
        (find(Event::Start), find(Event::End))
    }
}

/// A test case that records its run step in a [`Trace`].
pub struct RecordingCase {
    label: String,
    behavior: Behavior,
    trace: Arc<Trace>,
}

impl TestCase for RecordingCase {
    fn setup<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        async move {
            if matches!(self.behavior, Behavior::FailSetup) {
                bail!("setup of {} failed", self.label);
            }
            Ok(())
        }
        .boxed()
    }

    fn run<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        async move {
            self.trace.start(&self.label);
            // Yield so that concurrently scheduled cases overlap.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = match &self.behavior {
                Behavior::Fail(message) => Err(anyhow::anyhow!(*message)),
                Behavior::Panic(message) => {
                    self.trace.end(&self.label);
                    panic!("{}", message);
                }
                Behavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                _ => Ok(()),
            };
            self.trace.end(&self.label);
            result
        }
        .boxed()
    }

    fn terminate<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        async move {
            self.trace.terminated.lock().unwrap().push(self.label.clone());
            if matches!(self.behavior, Behavior::FailTerminate) {
                bail!("terminate of {} failed", self.label);
            }
            Ok(())
        }
        .boxed()
    }
}

/// Creates [`RecordingCase`]s, with behaviors keyed by module name.
#[derive(Clone)]
pub struct RecordingFactory {
    trace: Arc<Trace>,
    behaviors: Arc<HashMap<String, Behavior>>,
}

impl RecordingFactory {
    pub fn new(trace: Arc<Trace>) -> Self {
        Self {
            trace,
            behaviors: Arc::new(HashMap::new()),
        }
    }

    pub fn with(mut self, module_name: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.behaviors).insert(module_name.to_string(), behavior);
        self
    }
}

impl TestFactory for RecordingFactory {
    fn create(&self, descriptor: &TestDescriptor) -> Box<dyn TestCase> {
        Box::new(RecordingCase {
            label: descriptor.label(),
            behavior: self
                .behaviors
                .get(&descriptor.module_name)
                .cloned()
                .unwrap_or(Behavior::Pass),
            trace: self.trace.clone(),
        })
    }
}

/// Bracket executables that record into the same [`Trace`] as the tests.
#[derive(Clone)]
pub struct RecordingBrackets {
    trace: Arc<Trace>,
    failing_setup: Vec<Configuration>,
}

impl RecordingBrackets {
    pub fn new(trace: Arc<Trace>) -> Self {
        Self {
            trace,
            failing_setup: Vec::new(),
        }
    }

    pub fn failing_setup(mut self, configuration: Configuration) -> Self {
        self.failing_setup.push(configuration);
        self
    }
}

impl BracketProvider for RecordingBrackets {
    fn factory(&self, configuration: Configuration, kind: BracketKind) -> Arc<dyn TestFactory> {
        let mut factory = RecordingFactory::new(self.trace.clone());
        if kind == BracketKind::Setup && self.failing_setup.contains(&configuration) {
            factory = factory.with("bracket_setup", Behavior::Fail("could not create volume"));
        }
        Arc::new(factory)
    }
}

/// A registry where every discovered file resolves to a recording case.
pub fn recording_registry(factory: RecordingFactory, brackets: RecordingBrackets) -> TestRegistry {
    TestRegistry::new()
        .with_fallback(factory)
        .with_brackets(brackets)
}

/// An executor that answers every command with success and no output.
pub struct NoopExecutor;

impl RemoteExecutor for NoopExecutor {
    fn execute<'a>(
        &'a self,
        _node: &'a str,
        _command: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        async { Ok(CommandOutput::default()) }.boxed()
    }
}

pub fn test_env(log_dir: &Path) -> ExecutionEnv {
    ExecutionEnv::new(Arc::new(NoopExecutor), log_dir)
        .with_nodes(vec!["node1".to_string(), "node2".to_string()])
        .with_timeout(Duration::from_secs(30))
}
