//! # Cluster Runner Library
//!
//! This library provides the core functionality for Cluster Runner, a test
//! orchestration harness for clustered storage products. It discovers test
//! cases, classifies them into exclusive tests and shareable groups, and runs
//! them against a live multi-node cluster with bounded concurrency.
//!
//! ## Modules
//!
//! - `core` - Data models, classification, scheduling and result aggregation
//! - `infra` - Infrastructure services like remote command execution and log files
//! - `reporting` - Console and JSON reporting of aggregated results
//! - `cli` - Command-line interface and commands

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::aggregator;
pub use core::classifier;
pub use core::config;
pub use core::models;
pub use core::registry;
pub use core::scheduler;

/// Picks the UI language from the system locale.
///
/// Tries the full locale (e.g. "zh-CN") first, then the bare language code
/// (e.g. "en" from "en-US"), and finally falls back to "en".
pub fn detect_locale() -> String {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    resolve_locale(&locale)
}

/// Maps a requested locale onto one that has a translation file.
pub fn resolve_locale(requested: &str) -> String {
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&requested) {
        return requested.to_string();
    }
    requested
        .split(['-', '_'])
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
