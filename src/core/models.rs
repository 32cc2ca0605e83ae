//! # Data Models Module
//!
//! This module defines the core data structures used throughout the runner:
//! the closed set of cluster configurations, test natures, test descriptors
//! (the unit of scheduling) and the result records produced for every
//! executed descriptor.

use crate::core::registry::TestFactory;
use crate::infra::t;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How a test may share the cluster with other tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Nature {
    /// Mutates cluster-wide state or topology. Must never overlap any other test.
    Exclusive,
    /// Safe to run concurrently with siblings against one provisioned resource.
    Shareable,
    /// Framework-owned setup/teardown of a configuration's shared resource.
    Bracket,
}

impl Nature {
    /// Parses the nature field of a test header. `Bracket` is framework-owned
    /// and can never be declared by a test file.
    pub fn parse_declared(value: &str) -> Option<Nature> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("exclusive") {
            Some(Nature::Exclusive)
        } else if value.eq_ignore_ascii_case("shareable") {
            Some(Nature::Shareable)
        } else {
            None
        }
    }
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Nature::Exclusive => "Exclusive",
            Nature::Shareable => "Shareable",
            Nature::Bracket => "Bracket",
        };
        f.write_str(name)
    }
}

/// A cluster/resource layout a test is written against.
///
/// The set is closed: header tokens outside of it are fatal classification
/// errors. `Generic` is a reserved sentinel for configuration-agnostic
/// shareable tests and cannot be spelled in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Configuration {
    #[serde(rename = "rep")]
    Replicated,
    #[serde(rename = "dist")]
    Distributed,
    #[serde(rename = "disp")]
    Dispersed,
    #[serde(rename = "arb")]
    Arbiter,
    #[serde(rename = "dist-rep")]
    DistributedReplicated,
    #[serde(rename = "dist-disp")]
    DistributedDispersed,
    #[serde(rename = "dist-arb")]
    DistributedArbiter,
    #[serde(rename = "Generic")]
    Generic,
}

impl Configuration {
    /// Every layout a header may name, in canonical order.
    pub const LAYOUTS: [Configuration; 7] = [
        Configuration::Replicated,
        Configuration::Distributed,
        Configuration::Dispersed,
        Configuration::Arbiter,
        Configuration::DistributedReplicated,
        Configuration::DistributedDispersed,
        Configuration::DistributedArbiter,
    ];

    /// The token used in test headers, log paths and reports.
    pub fn token(&self) -> &'static str {
        match self {
            Configuration::Replicated => "rep",
            Configuration::Distributed => "dist",
            Configuration::Dispersed => "disp",
            Configuration::Arbiter => "arb",
            Configuration::DistributedReplicated => "dist-rep",
            Configuration::DistributedDispersed => "dist-disp",
            Configuration::DistributedArbiter => "dist-arb",
            Configuration::Generic => "Generic",
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Configuration::Generic)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Error returned when a header token is not part of the closed layout set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownConfiguration(pub String);

impl fmt::Display for UnknownConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown configuration '{}'", self.0)
    }
}

impl std::error::Error for UnknownConfiguration {}

impl FromStr for Configuration {
    type Err = UnknownConfiguration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Configuration::LAYOUTS
            .iter()
            .copied()
            .find(|layout| layout.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownConfiguration(token.to_string()))
    }
}

/// The unit of scheduling: one test module bound to one configuration.
///
/// `module_name`, `component_name` and `test_type` are descriptive only and
/// never influence scheduling.
#[derive(Clone)]
pub struct TestDescriptor {
    /// Filesystem identity of the test source (synthetic for brackets).
    pub module_path: PathBuf,
    /// Registry key: root-relative path without extension, `/`-separated.
    pub module_key: String,
    pub module_name: String,
    pub component_name: String,
    pub test_type: String,
    /// Factory for the executable behind this test, resolved at classification.
    pub test_class: Arc<dyn TestFactory>,
    pub nature: Nature,
    pub configuration: Configuration,
}

impl TestDescriptor {
    /// Short human-readable identity, e.g. `test_peer_probe[dist-rep]`.
    pub fn label(&self) -> String {
        format!("{}[{}]", self.module_name, self.configuration)
    }

    /// Location of this descriptor's log file below `log_dir`.
    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        let file_name = format!("{}.log", self.configuration.token());
        match self.nature {
            Nature::Bracket => log_dir
                .join("brackets")
                .join(self.configuration.token())
                .join(format!("{}.log", self.module_name)),
            _ => [&self.test_type, &self.component_name, &self.module_name]
                .iter()
                .filter(|segment| !segment.is_empty())
                .fold(log_dir.to_path_buf(), |path, segment| path.join(segment))
                .join(file_name),
        }
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("module_path", &self.module_path)
            .field("module_key", &self.module_key)
            .field("module_name", &self.module_name)
            .field("component_name", &self.component_name)
            .field("test_type", &self.test_type)
            .field("nature", &self.nature)
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

// The executable is an opaque handle, so equality is structural over the rest.
impl PartialEq for TestDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.module_path == other.module_path
            && self.module_key == other.module_key
            && self.module_name == other.module_name
            && self.component_name == other.component_name
            && self.test_type == other.test_type
            && self.nature == other.nature
            && self.configuration == other.configuration
    }
}

impl Eq for TestDescriptor {}

/// Final verdict of one executed descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail,
}

/// Enumerates the possible reasons for a descriptor failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The test's `setup` step returned an error.
    SetupFailed,
    /// The test's `run` step returned an error.
    TestFailed,
    /// `setup` and `run` passed but `terminate` returned an error.
    TerminateFailed,
    /// The descriptor exceeded its timeout.
    Timeout,
    /// A lifecycle step panicked.
    Panicked,
    /// Not executed because its configuration's setup bracket failed.
    BracketFailed,
    /// Not executed because the run was interrupted.
    Cancelled,
}

/// Opaque diagnostic payload attached to a result record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Where the per-test log was written, if a log was opened.
    pub log_path: Option<PathBuf>,
    /// Captured error text for failures.
    pub error: Option<String>,
}

/// The single, immutable outcome record of one executed descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub module_name: String,
    pub module_key: String,
    pub configuration: Configuration,
    pub nature: Nature,
    pub outcome: Outcome,
    pub reason: Option<FailureReason>,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub diagnostic: Diagnostic,
}

impl ResultRecord {
    /// Builds a record for a descriptor that actually executed.
    pub fn executed(
        descriptor: &TestDescriptor,
        reason: Option<FailureReason>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
        diagnostic: Diagnostic,
    ) -> Self {
        Self {
            module_name: descriptor.module_name.clone(),
            module_key: descriptor.module_key.clone(),
            configuration: descriptor.configuration,
            nature: descriptor.nature,
            outcome: if reason.is_some() { Outcome::Fail } else { Outcome::Pass },
            reason,
            elapsed,
            started_at,
            finished_at,
            diagnostic,
        }
    }

    /// Builds a failure record for a descriptor that was never started.
    pub fn not_run(descriptor: &TestDescriptor, reason: FailureReason, message: String) -> Self {
        let now = Utc::now();
        Self {
            module_name: descriptor.module_name.clone(),
            module_key: descriptor.module_key.clone(),
            configuration: descriptor.configuration,
            nature: descriptor.nature,
            outcome: Outcome::Fail,
            reason: Some(reason),
            elapsed: Duration::ZERO,
            started_at: now,
            finished_at: now,
            diagnostic: Diagnostic {
                log_path: None,
                error: Some(message),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Fail
    }

    /// Gets the status of the record as a localized string for display.
    pub fn get_status_str(&self, locale: &str) -> String {
        match (self.outcome, self.reason) {
            (Outcome::Pass, _) => t!("report.status_passed", locale = locale).to_string(),
            (Outcome::Fail, Some(FailureReason::Timeout)) => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            (Outcome::Fail, Some(FailureReason::BracketFailed | FailureReason::Cancelled)) => {
                t!("report.status_skipped", locale = locale).to_string()
            }
            (Outcome::Fail, _) => t!("report.status_failed", locale = locale).to_string(),
        }
    }
}
