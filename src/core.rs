//! # Core Module
//!
//! This module contains the core functionality of Cluster Runner: the data
//! models, test metadata extraction, classification into a run plan,
//! descriptor execution, scheduling and result aggregation.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod executables;
pub mod execution;
pub mod metadata;
pub mod models;
pub mod planner;
pub mod registry;
pub mod scheduler;

// Re-exports
pub use aggregator::{Aggregator, Report};
pub use classifier::{DiscoveryRequest, classify};
pub use config::RunnerConfig;
pub use models::{Configuration, Nature, ResultRecord, TestDescriptor};
pub use planner::RunPlan;
pub use scheduler::Scheduler;
