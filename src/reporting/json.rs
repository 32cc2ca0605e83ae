//! # JSON Reporting Module
//!
//! Writes the aggregated report as pretty-printed JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::core::aggregator::Report;

#[derive(Serialize)]
struct JsonReport<'a> {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    report: &'a Report,
}

/// Writes `report` to `output_path`, creating parent directories.
pub fn write_json_report(report: &Report, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }
    let document = JsonReport {
        total: report.total(),
        passed: report.passed(),
        failed: report.failed(),
        skipped: report.skipped(),
        report,
    };
    let json = serde_json::to_string_pretty(&document).context("Failed to serialize report")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write report: {}", output_path.display()))
}
