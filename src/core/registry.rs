//! # Test Registry Module
//!
//! Test executables are looked up by module key in an explicit registry that
//! is populated at startup. The scheduler only ever sees the [`TestCase`]
//! lifecycle (`setup`, `run`, `terminate`) behind a [`TestFactory`].

use crate::core::execution::TestContext;
use crate::core::models::{Configuration, TestDescriptor};
use anyhow::Result;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The lifecycle every test executable exposes.
///
/// `terminate` is always invoked once `setup` has been attempted, even when
/// `setup` or `run` failed.
pub trait TestCase: Send {
    fn setup<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        future::ready(Ok(())).boxed()
    }

    fn run<'a>(&'a mut self, ctx: &'a TestContext) -> BoxFuture<'a, Result<()>>;

    fn terminate<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, Result<()>> {
        future::ready(Ok(())).boxed()
    }
}

/// Creates a fresh [`TestCase`] instance for every execution of a descriptor.
pub trait TestFactory: Send + Sync {
    fn create(&self, descriptor: &TestDescriptor) -> Box<dyn TestCase>;
}

impl<F> TestFactory for F
where
    F: Fn(&TestDescriptor) -> Box<dyn TestCase> + Send + Sync,
{
    fn create(&self, descriptor: &TestDescriptor) -> Box<dyn TestCase> {
        self(descriptor)
    }
}

/// Which half of a bracket pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BracketKind {
    Setup,
    Teardown,
}

impl BracketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketKind::Setup => "setup",
            BracketKind::Teardown => "teardown",
        }
    }
}

/// Supplies the executables that provision and tear down the shared resource
/// of a configuration.
pub trait BracketProvider: Send + Sync {
    fn factory(&self, configuration: Configuration, kind: BracketKind) -> Arc<dyn TestFactory>;
}

impl<F> BracketProvider for F
where
    F: Fn(Configuration, BracketKind) -> Arc<dyn TestFactory> + Send + Sync,
{
    fn factory(&self, configuration: Configuration, kind: BracketKind) -> Arc<dyn TestFactory> {
        self(configuration, kind)
    }
}

/// Maps module keys to test factories.
#[derive(Clone)]
pub struct TestRegistry {
    tests: HashMap<String, Arc<dyn TestFactory>>,
    fallback: Option<Arc<dyn TestFactory>>,
    brackets: Arc<dyn BracketProvider>,
}

impl TestRegistry {
    /// An empty registry whose brackets do nothing.
    pub fn new() -> Self {
        Self {
            tests: HashMap::new(),
            fallback: None,
            brackets: Arc::new(crate::core::executables::CommandBracketProvider::default()),
        }
    }

    /// Registers the factory for a module key such as
    /// `functional/glusterd/test_peer_probe`.
    pub fn register(&mut self, key: impl Into<String>, factory: impl TestFactory + 'static) {
        self.tests.insert(key.into(), Arc::new(factory));
    }

    pub fn with_test(mut self, key: impl Into<String>, factory: impl TestFactory + 'static) -> Self {
        self.register(key, factory);
        self
    }

    /// Factory used for every module key without an explicit registration.
    pub fn with_fallback(mut self, factory: impl TestFactory + 'static) -> Self {
        self.fallback = Some(Arc::new(factory));
        self
    }

    pub fn with_brackets(mut self, provider: impl BracketProvider + 'static) -> Self {
        self.brackets = Arc::new(provider);
        self
    }

    pub fn resolve(&self, key: &str) -> Option<Arc<dyn TestFactory>> {
        self.tests.get(key).or(self.fallback.as_ref()).cloned()
    }

    pub fn bracket_factory(
        &self,
        configuration: Configuration,
        kind: BracketKind,
    ) -> Arc<dyn TestFactory> {
        self.brackets.factory(configuration, kind)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.tests.keys().collect();
        keys.sort();
        f.debug_struct("TestRegistry")
            .field("tests", &keys)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}
