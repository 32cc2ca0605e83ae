//! # Reporting Module
//!
//! This module prints aggregated run reports to the console with colors and
//! localized labels, and writes them as JSON for other tools.

pub mod console;
pub mod json;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
pub use json::write_json_report;
