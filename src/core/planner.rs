//! # Run Plan Module
//!
//! This module holds the validated partition of all discovered tests and the
//! bracket synthesizer that gives every shareable configuration its
//! setup/teardown pair.

use crate::core::models::{Configuration, Nature, TestDescriptor};
use crate::core::registry::{BracketKind, TestRegistry};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The setup and teardown descriptors of one configuration's shared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPair {
    pub setup: TestDescriptor,
    pub teardown: TestDescriptor,
}

/// Synthesizes the bracket pair for `configuration`.
///
/// The classifier calls this once per configuration that has at least one
/// shareable test, so each configuration owns exactly one pair.
pub fn make_brackets(configuration: Configuration, registry: &TestRegistry) -> BracketPair {
    BracketPair {
        setup: bracket_descriptor(configuration, BracketKind::Setup, registry),
        teardown: bracket_descriptor(configuration, BracketKind::Teardown, registry),
    }
}

fn bracket_descriptor(
    configuration: Configuration,
    kind: BracketKind,
    registry: &TestRegistry,
) -> TestDescriptor {
    let module_name = format!("bracket_{}", kind.as_str());
    TestDescriptor {
        module_path: PathBuf::from("<brackets>")
            .join(configuration.token())
            .join(kind.as_str()),
        module_key: format!("<brackets>/{}/{}", configuration.token(), kind.as_str()),
        module_name,
        component_name: "brackets".to_string(),
        test_type: "framework".to_string(),
        test_class: registry.bracket_factory(configuration, kind),
        nature: Nature::Bracket,
        configuration,
    }
}

/// The validated, immutable partition of all discovered tests.
///
/// Built once by [`crate::core::classifier::classify`] and moved into the
/// scheduler; there is no mutating API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    exclusive_tests: Vec<TestDescriptor>,
    shareable_groups: BTreeMap<Configuration, Vec<TestDescriptor>>,
    brackets: BTreeMap<Configuration, BracketPair>,
}

impl RunPlan {
    pub(crate) fn new(
        exclusive_tests: Vec<TestDescriptor>,
        shareable_groups: BTreeMap<Configuration, Vec<TestDescriptor>>,
        brackets: BTreeMap<Configuration, BracketPair>,
    ) -> Self {
        Self {
            exclusive_tests,
            shareable_groups,
            brackets,
        }
    }

    /// Exclusive descriptors in discovery order.
    pub fn exclusive_tests(&self) -> &[TestDescriptor] {
        &self.exclusive_tests
    }

    pub fn shareable_groups(&self) -> &BTreeMap<Configuration, Vec<TestDescriptor>> {
        &self.shareable_groups
    }

    pub fn brackets(&self) -> &BTreeMap<Configuration, BracketPair> {
        &self.brackets
    }

    /// Number of shareable descriptors across all configurations.
    pub fn shareable_count(&self) -> usize {
        self.shareable_groups.values().map(Vec::len).sum()
    }

    /// Number of descriptors the scheduler will produce records for,
    /// brackets included.
    pub fn descriptor_count(&self) -> usize {
        self.exclusive_tests.len() + self.shareable_count() + self.brackets.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.exclusive_tests.is_empty() && self.shareable_groups.is_empty()
    }

    /// Splits the plan into its parts for execution.
    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<TestDescriptor>,
        BTreeMap<Configuration, Vec<TestDescriptor>>,
        BTreeMap<Configuration, BracketPair>,
    ) {
        (self.exclusive_tests, self.shareable_groups, self.brackets)
    }
}
