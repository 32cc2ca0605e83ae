//! # Console Reporting Module
//!
//! This module prints the aggregated report to the console: a per-module
//! summary table and the details of every failed descriptor.

use colored::*;

use crate::core::aggregator::Report;
use crate::core::models::{FailureReason, Outcome, ResultRecord};
use crate::infra::t;

/// Prints a formatted summary of the report.
///
/// # Output Format
/// ```text
/// --- Test Summary ---
///   - Status           | Test Name                                | Config     |   Duration
///   - Passed           | test_peer_probe                          | rep        |      1.23s
///   - Failed           | test_volume_start                        | dist       |      0.45s
///   - Skipped          | test_quota_limit                         | disp       |        N/A
/// ```
pub fn print_summary(report: &Report, locale: &str) {
    println!("\n{}", t!("test_summary_banner", locale = locale).bold());

    for (module_name, entries) in report.modules() {
        for entry in entries {
            let record = &entry.record;
            let status_str = record.get_status_str(locale);
            let status_colored = match (record.outcome, record.reason) {
                (Outcome::Pass, _) => status_str.green(),
                (_, Some(FailureReason::BracketFailed | FailureReason::Cancelled)) => {
                    status_str.yellow()
                }
                _ => status_str.red(),
            };
            let duration_str = if record.elapsed.is_zero() && record.is_failure() {
                "N/A".to_string()
            } else {
                format!("{:.2?}", entry.elapsed)
            };

            println!(
                "  - {:<18} | {:<40} | {:<10} | {:>10}",
                status_colored,
                module_name,
                entry.configuration.token(),
                duration_str
            );
        }
    }

    println!(
        "\n{}",
        t!(
            "report.totals",
            locale = locale,
            total = report.total(),
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped()
        )
    );
}

/// Prints the captured error and log location of every failed descriptor.
pub fn print_failure_details(report: &Report, locale: &str) {
    let failures: Vec<&ResultRecord> = report.failures().collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, record) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}' ({}, {})",
            i + 1,
            failures.len(),
            t!("report_header_failure", locale = locale).red(),
            record.module_name.cyan(),
            record.configuration,
            record.nature
        );
        if let Some(reason) = record.reason {
            println!("  {}: {:?}", t!("report.reason", locale = locale), reason);
        }
        if let Some(path) = &record.diagnostic.log_path {
            println!("  {}: {}", t!("report.log_file", locale = locale), path.display());
        }
        if let Some(error) = &record.diagnostic.error {
            println!("\n{}", error);
        }
        println!("\n{}", "-".repeat(80));
    }
}
