//! # Test Metadata Module
//!
//! Every test file declares how it may be scheduled in a single header
//! comment of the form `nature;csv-of-configs`, for example:
//!
//! ```text
//! # Shareable;rep,dist-rep
//! ```
//!
//! An empty configuration field (`# Shareable;`) marks a configuration
//! agnostic test and resolves to [`Configuration::Generic`].

use crate::core::classifier::ClassifyError;
use crate::core::models::{Configuration, Nature};
use std::fs;
use std::path::Path;

/// Comment markers accepted in front of the header.
const COMMENT_MARKERS: [&str; 3] = ["//", "#", "--"];

/// Scheduling metadata declared by one test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMetadata {
    pub nature: Nature,
    /// Declared configurations in declaration order, without duplicates.
    pub configurations: Vec<Configuration>,
}

/// Reads a test file and parses its header.
pub fn extract_metadata(path: &Path) -> Result<TestMetadata, ClassifyError> {
    let content = fs::read_to_string(path).map_err(|source| ClassifyError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_header(path, &content)
}

/// Parses the metadata header out of a test file's text.
///
/// `path` is only used to identify the file in errors.
pub fn parse_header(path: &Path, content: &str) -> Result<TestMetadata, ClassifyError> {
    let line = header_line(content).ok_or_else(|| ClassifyError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let malformed = || ClassifyError::MalformedHeader {
        path: path.to_path_buf(),
        line: line.to_string(),
    };

    let body = strip_comment_marker(line).ok_or_else(malformed)?;
    let fields: Vec<&str> = body.split(';').collect();
    let [nature_field, configs_field] = fields.as_slice() else {
        return Err(malformed());
    };

    let nature = Nature::parse_declared(nature_field).ok_or_else(|| {
        ClassifyError::UnknownNature {
            path: path.to_path_buf(),
            value: nature_field.trim().to_string(),
        }
    })?;

    let configs_field = configs_field.trim();
    if configs_field.is_empty() {
        return Ok(TestMetadata {
            nature,
            configurations: vec![Configuration::Generic],
        });
    }

    let mut configurations = Vec::new();
    for token in configs_field.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(malformed());
        }
        let configuration: Configuration = token.parse().map_err(|_| {
            ClassifyError::UnknownConfiguration {
                path: path.to_path_buf(),
                value: token.to_string(),
            }
        })?;
        if !configurations.contains(&configuration) {
            configurations.push(configuration);
        }
    }

    Ok(TestMetadata {
        nature,
        configurations,
    })
}

/// Returns the first meaningful line, skipping blank lines and one shebang.
fn header_line(content: &str) -> Option<&str> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    if first.starts_with("#!") {
        lines.next()
    } else {
        Some(first)
    }
}

fn strip_comment_marker(line: &str) -> Option<&str> {
    COMMENT_MARKERS
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(|rest| rest.trim_start_matches(['#', '/', '-']).trim())
}
