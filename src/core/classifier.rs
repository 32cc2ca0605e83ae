//! # Test Classifier Module
//!
//! Walks a test tree, reads every test file's metadata header, resolves the
//! executable behind it from the [`TestRegistry`] and partitions the resulting
//! descriptors into a [`RunPlan`].
//!
//! Classification is all-or-nothing: the first invalid file aborts the whole
//! pass, so a partially classified tree never reaches the scheduler.

use crate::core::metadata::extract_metadata;
use crate::core::models::{Configuration, Nature, TestDescriptor};
use crate::core::planner::{RunPlan, make_brackets};
use crate::core::registry::TestRegistry;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Default file-name prefix of test files.
pub const DEFAULT_FILE_PREFIX: &str = "test_";

/// Fatal errors raised while classifying a test tree.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read test file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk test directory '{root}': {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("test file '{path}' has no metadata header (expected `nature;csv-of-configs`)")]
    MissingHeader { path: PathBuf },

    #[error("test file '{path}' has a malformed metadata header: '{line}'")]
    MalformedHeader { path: PathBuf, line: String },

    #[error("test file '{path}' declares unknown nature '{value}' (expected Exclusive or Shareable)")]
    UnknownNature { path: PathBuf, value: String },

    #[error("test file '{path}' declares unknown configuration '{value}'")]
    UnknownConfiguration { path: PathBuf, value: String },

    #[error("exclusive test '{path}' must declare at least one configuration")]
    ConfigurationRequired { path: PathBuf },

    #[error("no executable is registered for test '{key}' ({path})")]
    UnresolvedExecutable { path: PathBuf, key: String },
}

/// What to discover and what to leave out.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Root of the test tree.
    pub root: PathBuf,
    /// Files or directories to skip, either as given or relative to `root`.
    pub excluded: Vec<PathBuf>,
    /// Classify only this file instead of walking `root`.
    pub single_file: Option<PathBuf>,
    /// Only files whose name starts with this prefix are tests.
    pub file_prefix: String,
}

impl DiscoveryRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
            single_file: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    pub fn single_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.single_file = Some(path.into());
        self
    }

    /// True if `path` is an excluded path or lies below one.
    ///
    /// `.` components are ignored on both sides, so `./functional/skip` and
    /// `functional/skip` name the same directory.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path = lexical(path);
        let root = lexical(&self.root);
        let relative = path.strip_prefix(&root).ok();
        self.excluded.iter().map(|excluded| lexical(excluded)).any(|excluded| {
            path.starts_with(&excluded) || relative.is_some_and(|rel| rel.starts_with(&excluded))
        })
    }

    fn is_test_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&self.file_prefix))
    }
}

/// Classifies a test tree into a validated, immutable [`RunPlan`].
pub fn classify(
    request: &DiscoveryRequest,
    registry: &TestRegistry,
) -> Result<RunPlan, ClassifyError> {
    let candidates = discover(request)?;
    debug!(root = %request.root.display(), count = candidates.len(), "discovered test files");

    let mut exclusive_tests = Vec::new();
    let mut shareable_groups: BTreeMap<Configuration, Vec<TestDescriptor>> = BTreeMap::new();

    for path in candidates {
        for descriptor in describe(&path, request, registry)? {
            match descriptor.nature {
                Nature::Exclusive => exclusive_tests.push(descriptor),
                _ => shareable_groups
                    .entry(descriptor.configuration)
                    .or_default()
                    .push(descriptor),
            }
        }
    }

    let brackets = shareable_groups
        .keys()
        .filter(|configuration| !configuration.is_generic())
        .map(|&configuration| (configuration, make_brackets(configuration, registry)))
        .collect();

    Ok(RunPlan::new(exclusive_tests, shareable_groups, brackets))
}

/// Drops `.` components. Nothing is resolved against the filesystem.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Lists candidate test files in a stable, file-name order.
fn discover(request: &DiscoveryRequest) -> Result<Vec<PathBuf>, ClassifyError> {
    if let Some(single) = &request.single_file {
        return Ok(if request.is_excluded(single) {
            Vec::new()
        } else {
            vec![single.clone()]
        });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(&request.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !request.is_excluded(entry.path()));
    for entry in walker {
        let entry = entry.map_err(|source| ClassifyError::Walk {
            root: request.root.clone(),
            source,
        })?;
        if entry.file_type().is_file() && request.is_test_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Builds the descriptors of one test file, one per declared configuration.
fn describe(
    path: &Path,
    request: &DiscoveryRequest,
    registry: &TestRegistry,
) -> Result<Vec<TestDescriptor>, ClassifyError> {
    let metadata = extract_metadata(path)?;
    if metadata.nature == Nature::Exclusive
        && metadata.configurations.contains(&Configuration::Generic)
    {
        return Err(ClassifyError::ConfigurationRequired {
            path: path.to_path_buf(),
        });
    }

    let segments = PathSegments::derive(path, &request.root);
    let test_class = registry.resolve(&segments.module_key).ok_or_else(|| {
        ClassifyError::UnresolvedExecutable {
            path: path.to_path_buf(),
            key: segments.module_key.clone(),
        }
    })?;

    Ok(metadata
        .configurations
        .into_iter()
        .map(|configuration| TestDescriptor {
            module_path: path.to_path_buf(),
            module_key: segments.module_key.clone(),
            module_name: segments.module_name.clone(),
            component_name: segments.component_name.clone(),
            test_type: segments.test_type.clone(),
            test_class: test_class.clone(),
            nature: metadata.nature,
            configuration,
        })
        .collect())
}

/// Descriptive path segments of a test file.
#[derive(Debug, Default, PartialEq, Eq)]
struct PathSegments {
    module_key: String,
    module_name: String,
    component_name: String,
    test_type: String,
}

impl PathSegments {
    fn derive(path: &Path, root: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let directories: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|component| match component {
                        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let module_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut key_parts = directories.clone();
        key_parts.push(module_name.clone());

        Self {
            module_key: key_parts.join("/"),
            // A file directly below its test-type directory has no component.
            component_name: match directories.as_slice() {
                [_, .., component] => component.clone(),
                _ => String::new(),
            },
            test_type: directories.first().cloned().unwrap_or_default(),
            module_name,
        }
    }
}
