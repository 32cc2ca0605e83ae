//! # Scheduler Integration Tests
//!
//! These tests classify temporary test trees, run them through the scheduler
//! with recording test cases and check phase ordering, concurrency limits,
//! fault isolation and cancellation.

mod common;

use cluster_runner::aggregator::Aggregator;
use cluster_runner::classifier::{DiscoveryRequest, classify};
use cluster_runner::core::execution::TestContext;
use cluster_runner::models::{
    Configuration, FailureReason, Nature, Outcome, ResultRecord, TestDescriptor,
};
use cluster_runner::registry::{TestCase, TestRegistry};
use cluster_runner::scheduler::{RunPhase, Scheduler, SchedulerError};
use common::{
    Behavior, RecordingBrackets, RecordingFactory, TestTree, Trace, recording_registry, test_env,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn label(record: &ResultRecord) -> String {
    format!("{}[{}]", record.module_name, record.configuration)
}

async fn run_to_records(
    tree: &TestTree,
    registry: &TestRegistry,
    scheduler: Scheduler,
) -> Vec<ResultRecord> {
    let plan = classify(&DiscoveryRequest::new(tree.root()), registry).unwrap();
    let mut handle = scheduler.run(plan);
    let mut records = Vec::new();
    while let Some(record) = handle.results.next().await {
        records.push(record);
    }
    handle.completion.await.unwrap().unwrap();
    records
}

fn position(records: &[ResultRecord], wanted: &str) -> usize {
    records
        .iter()
        .position(|record| label(record) == wanted)
        .unwrap_or_else(|| panic!("no record for {wanted}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_phase_order_for_mixed_tree() {
    let tree = TestTree::new();
    tree.add("test_a.sh", "Shareable;rep");
    tree.add("test_b.sh", "Shareable;rep");
    tree.add("test_c.sh", "Exclusive;rep,dist");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace.clone()),
    );
    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 2)).await;

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|record| record.outcome == Outcome::Pass));

    let setup = position(&records, "bracket_setup[rep]");
    let a = position(&records, "test_a[rep]");
    let b = position(&records, "test_b[rep]");
    let teardown = position(&records, "bracket_teardown[rep]");
    let exclusive_rep = position(&records, "test_c[rep]");
    let exclusive_dist = position(&records, "test_c[dist]");

    assert_eq!(setup, 0);
    assert!(setup < a && setup < b);
    assert!(a < teardown && b < teardown);
    assert!(teardown < exclusive_rep);
    assert!(exclusive_rep < exclusive_dist);
    assert_eq!(records[exclusive_rep].nature, Nature::Exclusive);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_tests_never_overlap() {
    let tree = TestTree::new();
    for name in ["one", "two", "three", "four"] {
        tree.add(&format!("test_share_{name}.sh"), "Shareable;rep,dist");
    }
    tree.add("test_excl_x.sh", "Exclusive;rep,disp");
    tree.add("test_excl_y.sh", "Exclusive;arb");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace.clone()),
    );
    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 3)).await;
    assert_eq!(records.len(), 8 + 4 + 3);

    let spans: Vec<_> = records
        .iter()
        .map(|record| (label(record), record.nature, trace.span(&label(record))))
        .collect();
    for (exclusive, _, (start, end)) in spans.iter().filter(|(_, n, _)| *n == Nature::Exclusive) {
        for (other, _, (other_start, other_end)) in &spans {
            if other == exclusive {
                continue;
            }
            assert!(
                other_end <= start || end <= other_start,
                "{exclusive} overlapped {other}"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_is_respected() {
    let tree = TestTree::new();
    for i in 0..6 {
        tree.add(&format!("test_load_{i}.sh"), "Shareable;dist-rep");
    }
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let mut factory = RecordingFactory::new(trace.clone());
    for i in 0..6 {
        factory = factory.with(
            &format!("test_load_{i}"),
            Behavior::Sleep(Duration::from_millis(50)),
        );
    }
    let registry = recording_registry(factory, RecordingBrackets::new(trace.clone()));
    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 2)).await;

    assert_eq!(records.len(), 8);
    assert_eq!(trace.max_in_flight(), 2);
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let tree = TestTree::new();
    tree.add("test_ok.sh", "Shareable;rep");
    tree.add("test_error.sh", "Shareable;rep");
    tree.add("test_panic.sh", "Shareable;rep");
    tree.add("test_setup.sh", "Shareable;rep");
    tree.add("test_terminate.sh", "Exclusive;dist");
    tree.add("test_after.sh", "Exclusive;dist");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let factory = RecordingFactory::new(trace.clone())
        .with("test_error", Behavior::Fail("volume is not started"))
        .with("test_panic", Behavior::Panic("index out of bounds"))
        .with("test_setup", Behavior::FailSetup)
        .with("test_terminate", Behavior::FailTerminate);
    let registry = recording_registry(factory, RecordingBrackets::new(trace.clone()));
    let plan = classify(&DiscoveryRequest::new(tree.root()), &registry).unwrap();

    let report = Aggregator::collect(Scheduler::new(test_env(logs.path()), 2).run(plan))
        .await
        .unwrap();

    assert_eq!(report.total(), 8);
    assert_eq!(report.failed(), 4);
    let reason = |name: &str| report.entries(name)[0].record.reason;
    assert_eq!(reason("test_ok"), None);
    assert_eq!(reason("test_error"), Some(FailureReason::TestFailed));
    assert_eq!(reason("test_panic"), Some(FailureReason::Panicked));
    assert_eq!(reason("test_setup"), Some(FailureReason::SetupFailed));
    assert_eq!(reason("test_terminate"), Some(FailureReason::TerminateFailed));
    assert_eq!(reason("test_after"), None);

    let error = report.entries("test_error")[0]
        .record
        .diagnostic
        .error
        .clone()
        .unwrap();
    assert!(error.contains("volume is not started"));
    let panic_message = report.entries("test_panic")[0]
        .record
        .diagnostic
        .error
        .clone()
        .unwrap();
    assert!(panic_message.contains("index out of bounds"));

    // Terminate runs even when setup failed.
    assert!(trace.terminated().contains(&"test_setup[rep]".to_string()));
}

#[tokio::test]
async fn test_bracket_setup_failure_skips_only_that_group() {
    let tree = TestTree::new();
    tree.add("test_rep_one.sh", "Shareable;rep");
    tree.add("test_rep_two.sh", "Shareable;rep");
    tree.add("test_dist.sh", "Shareable;dist");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace.clone()).failing_setup(Configuration::Replicated),
    );
    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 2)).await;

    assert_eq!(records.len(), 3 + 4);
    let by_label = |wanted: &str| records[position(&records, wanted)].clone();

    let setup = by_label("bracket_setup[rep]");
    assert_eq!(setup.reason, Some(FailureReason::TestFailed));
    for member in ["test_rep_one[rep]", "test_rep_two[rep]"] {
        let record = by_label(member);
        assert_eq!(record.reason, Some(FailureReason::BracketFailed));
        assert!(record.diagnostic.error.unwrap().contains("could not create volume"));
        assert!(!trace.started().contains(&member.to_string()));
    }
    assert_eq!(by_label("bracket_teardown[rep]").outcome, Outcome::Pass);
    assert_eq!(by_label("test_dist[dist]").outcome, Outcome::Pass);
    assert_eq!(by_label("bracket_teardown[dist]").outcome, Outcome::Pass);
}

#[tokio::test]
async fn test_timeout_marks_descriptor_and_still_terminates() {
    let tree = TestTree::new();
    tree.add("test_hang.sh", "Exclusive;rep");
    tree.add("test_next.sh", "Exclusive;rep");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let factory = RecordingFactory::new(trace.clone())
        .with("test_hang", Behavior::Sleep(Duration::from_secs(30)));
    let registry = recording_registry(factory, RecordingBrackets::new(trace.clone()));
    let env = test_env(logs.path()).with_timeout(Duration::from_millis(200));
    let records = run_to_records(&tree, &registry, Scheduler::new(env, 1)).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].module_name, "test_hang");
    assert_eq!(records[0].reason, Some(FailureReason::Timeout));
    assert!(records[0].elapsed < Duration::from_secs(5));
    assert!(trace.terminated().contains(&"test_hang[rep]".to_string()));
    assert_eq!(records[1].outcome, Outcome::Pass);
}

#[tokio::test]
async fn test_cancelled_before_start_records_every_descriptor() {
    let tree = TestTree::new();
    tree.add("test_a.sh", "Shareable;rep");
    tree.add("test_b.sh", "Shareable;");
    tree.add("test_c.sh", "Exclusive;dist");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace.clone()),
    );
    let token = CancellationToken::new();
    token.cancel();
    let scheduler = Scheduler::new(test_env(logs.path()), 2).with_cancellation(token);
    let records = run_to_records(&tree, &registry, scheduler).await;

    assert_eq!(records.len(), 5);
    assert!(
        records
            .iter()
            .all(|record| record.reason == Some(FailureReason::Cancelled))
    );
    assert!(trace.started().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_mid_group_still_tears_down() {
    let tree = TestTree::new();
    tree.add("test_one.sh", "Shareable;rep");
    tree.add("test_two.sh", "Shareable;rep");
    tree.add("test_three.sh", "Shareable;rep");
    tree.add("test_excl.sh", "Exclusive;rep");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let mut factory = RecordingFactory::new(trace.clone());
    for name in ["test_one", "test_two", "test_three"] {
        factory = factory.with(name, Behavior::Sleep(Duration::from_millis(300)));
    }
    let registry = recording_registry(factory, RecordingBrackets::new(trace.clone()));
    let token = CancellationToken::new();
    let scheduler = Scheduler::new(test_env(logs.path()), 1).with_cancellation(token.clone());

    let watcher = {
        let trace = trace.clone();
        tokio::spawn(async move {
            // Setup bracket plus the first member.
            while trace.started().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            token.cancel();
        })
    };
    let records = run_to_records(&tree, &registry, scheduler).await;
    watcher.await.unwrap();

    assert_eq!(records.len(), 6);
    let members: Vec<_> = records
        .iter()
        .filter(|record| record.nature == Nature::Shareable)
        .collect();
    assert_eq!(
        members.iter().filter(|r| r.outcome == Outcome::Pass).count(),
        1
    );
    assert_eq!(
        members
            .iter()
            .filter(|r| r.reason == Some(FailureReason::Cancelled))
            .count(),
        2
    );
    assert_eq!(
        records[position(&records, "bracket_teardown[rep]")].outcome,
        Outcome::Pass
    );
    assert_eq!(
        records[position(&records, "test_excl[rep]")].reason,
        Some(FailureReason::Cancelled)
    );
}

/// Records the scheduler phase each descriptor observed while running.
struct PhaseRecorder {
    phase: Arc<Mutex<Option<watch::Receiver<RunPhase>>>>,
    seen: Arc<Mutex<Vec<(String, RunPhase)>>>,
    label: String,
}

impl TestCase for PhaseRecorder {
    fn run<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            let phase = *self.phase.lock().unwrap().as_ref().unwrap().borrow();
            self.seen.lock().unwrap().push((self.label.clone(), phase));
            Ok(())
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_phase_is_published() {
    let tree = TestTree::new();
    tree.add("test_shared.sh", "Shareable;");
    tree.add("test_alone.sh", "Exclusive;rep");
    let logs = tempfile::tempdir().unwrap();

    let slot: Arc<Mutex<Option<watch::Receiver<RunPhase>>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let factory = {
        let slot = slot.clone();
        let seen = seen.clone();
        move |descriptor: &TestDescriptor| -> Box<dyn TestCase> {
            Box::new(PhaseRecorder {
                phase: slot.clone(),
                seen: seen.clone(),
                label: descriptor.label(),
            })
        }
    };
    let registry = TestRegistry::new().with_fallback(factory);
    let plan = classify(&DiscoveryRequest::new(tree.root()), &registry).unwrap();

    let handle = Scheduler::new(test_env(logs.path()), 2).run(plan);
    let phase = handle.phase.clone();
    *slot.lock().unwrap() = Some(handle.phase.clone());
    let report = Aggregator::collect(handle).await.unwrap();

    assert!(report.is_success());
    assert_eq!(*phase.borrow(), RunPhase::Done);
    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("test_shared[Generic]".to_string(), RunPhase::RunningShareable),
            ("test_alone[rep]".to_string(), RunPhase::RunningExclusive),
        ]
    );
}

#[tokio::test]
async fn test_empty_plan_finishes_immediately() {
    let tree = TestTree::new();
    let logs = tempfile::tempdir().unwrap();
    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace),
    );

    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 4)).await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_each_descriptor_writes_its_log() {
    let tree = TestTree::new();
    tree.add("functional/glusterd/test_logged.sh", "Shareable;disp");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace),
    );
    let records =
        run_to_records(&tree, &registry, Scheduler::new(test_env(logs.path()), 1)).await;

    let record = &records[position(&records, "test_logged[disp]")];
    let log_path = record.diagnostic.log_path.clone().unwrap();
    assert_eq!(
        log_path,
        logs.path().join("functional/glusterd/test_logged/disp.log")
    );
    let content = std::fs::read_to_string(log_path).unwrap();
    assert!(content.contains("PASS"));
    assert!(
        logs.path()
            .join("brackets/disp/bracket_setup.log")
            .is_file()
    );
}

/// Panics when dropped, after the execution wrapper has already let go of it.
struct PanicOnDrop;

impl TestCase for PanicOnDrop {
    fn run<'a>(&'a mut self, _ctx: &'a TestContext) -> BoxFuture<'a, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }
}

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("volume handle released twice");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_crash_aborts_the_run() {
    let tree = TestTree::new();
    tree.add("test_crash.sh", "Shareable;rep");
    tree.add("test_excl.sh", "Exclusive;dist");
    let logs = tempfile::tempdir().unwrap();

    let trace = Trace::new();
    let registry = recording_registry(
        RecordingFactory::new(trace.clone()),
        RecordingBrackets::new(trace.clone()),
    )
    .with_test("test_crash", |_: &TestDescriptor| -> Box<dyn TestCase> {
        Box::new(PanicOnDrop)
    });
    let plan = classify(&DiscoveryRequest::new(tree.root()), &registry).unwrap();

    let result = Aggregator::collect(Scheduler::new(test_env(logs.path()), 2).run(plan)).await;

    assert!(matches!(result, Err(SchedulerError::WorkerCrashed(_))));
    let started = trace.started();
    assert_eq!(started, vec!["bracket_setup[rep]".to_string()]);
    // Neither the exclusive phase nor the teardown of the crashed group ran.
    assert!(!started.contains(&"test_excl[dist]".to_string()));
    assert!(!started.contains(&"bracket_teardown[rep]".to_string()));
}
