//! # Infrastructure Module
//!
//! This module provides infrastructure services for Cluster Runner,
//! including local and remote command execution, per-test log files and
//! path helpers.

pub mod command;
pub mod fs;
pub mod remote;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
