//! # Result Aggregator Module
//!
//! Folds the scheduler's result stream into a per-module report. Records of
//! the shareable phase arrive in no particular order; within one module the
//! report keeps them in arrival order.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::models::{Configuration, FailureReason, Nature, Outcome, ResultRecord};
use crate::core::scheduler::{RunHandle, SchedulerError};

/// One executed (configuration, outcome) pair of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub configuration: Configuration,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub record: ResultRecord,
}

/// Read-only snapshot of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    modules: BTreeMap<String, Vec<ReportEntry>>,
}

impl Report {
    /// Entries per module name.
    pub fn modules(&self) -> &BTreeMap<String, Vec<ReportEntry>> {
        &self.modules
    }

    pub fn entries(&self, module_name: &str) -> &[ReportEntry] {
        self.modules
            .get(module_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.modules.values().flatten().map(|entry| &entry.record)
    }

    pub fn total(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    pub fn passed(&self) -> usize {
        self.records().filter(|record| !record.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// Failed records that never executed (bracket failure or interruption).
    pub fn skipped(&self) -> usize {
        self.records()
            .filter(|record| {
                matches!(
                    record.reason,
                    Some(FailureReason::BracketFailed | FailureReason::Cancelled)
                )
            })
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records().filter(|record| record.is_failure())
    }

    /// Total time spent in tests of `nature`, summed over records.
    pub fn time_spent(&self, nature: Nature) -> Duration {
        self.records()
            .filter(|record| record.nature == nature)
            .map(|record| record.elapsed)
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Accumulates result records into a [`Report`].
#[derive(Debug, Default)]
pub struct Aggregator {
    report: Report,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ResultRecord) {
        self.report
            .modules
            .entry(record.module_name.clone())
            .or_default()
            .push(ReportEntry {
                configuration: record.configuration,
                outcome: record.outcome,
                elapsed: record.elapsed,
                record,
            });
    }

    pub fn snapshot(&self) -> &Report {
        &self.report
    }

    pub fn finish(self) -> Report {
        self.report
    }

    /// Drains a run's result stream and waits for the scheduler to report
    /// completion. A fatal scheduler error is returned instead of a report.
    pub async fn collect(handle: RunHandle) -> Result<Report, SchedulerError> {
        let RunHandle {
            mut results,
            completion,
            ..
        } = handle;

        let mut aggregator = Aggregator::new();
        while let Some(record) = results.next().await {
            aggregator.record(record);
        }

        match completion.await {
            Ok(Ok(())) => Ok(aggregator.finish()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(SchedulerError::Aborted(e.to_string())),
        }
    }
}
