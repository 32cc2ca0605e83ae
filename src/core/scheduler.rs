//! # Scheduler Module
//!
//! Executes a [`RunPlan`] in two strictly ordered phases:
//!
//! 1. **Shareable**: every configuration group is driven concurrently. A
//!    driver runs the group's setup bracket, enqueues its members on one job
//!    queue shared by `concurrency_limit` workers, waits for all of them and
//!    then runs the teardown bracket.
//! 2. **Exclusive**: once every shareable job has drained, exclusive tests
//!    run one at a time in plan order.
//!
//! Every descriptor yields exactly one [`ResultRecord`] on the result stream,
//! or the run ends with a [`SchedulerError`].

use colored::*;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    core::{
        execution::{ExecutionEnv, execute_descriptor},
        models::{Configuration, FailureReason, ResultRecord, TestDescriptor},
        planner::{BracketPair, RunPlan},
    },
    infra::t,
};

/// Lifecycle of one scheduler run. Phases are never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Init,
    RunningShareable,
    RunningExclusive,
    Done,
}

/// Fatal run failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A worker task died. Cluster state can no longer be trusted.
    #[error("a shareable worker crashed: {0}")]
    WorkerCrashed(String),

    /// The scheduler task itself died.
    #[error("the scheduler task failed: {0}")]
    Aborted(String),
}

/// Handle on a running schedule.
pub struct RunHandle {
    /// One record per descriptor; ends once the scheduler finishes.
    pub results: UnboundedReceiverStream<ResultRecord>,
    /// Current phase of the run.
    pub phase: watch::Receiver<RunPhase>,
    /// Resolves when the run is over.
    pub completion: JoinHandle<Result<(), SchedulerError>>,
}

type ResultSender = mpsc::UnboundedSender<ResultRecord>;

/// A queued shareable descriptor.
struct Job {
    descriptor: TestDescriptor,
    // Acknowledged once the job's record is sent. A job dropped without an
    // ack died with its worker.
    done: mpsc::UnboundedSender<()>,
}

/// Runs run plans against one execution environment.
pub struct Scheduler {
    env: ExecutionEnv,
    concurrency_limit: usize,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(env: ExecutionEnv, concurrency_limit: usize) -> Self {
        Self {
            env,
            concurrency_limit: concurrency_limit.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops starting new descriptors once `token` is cancelled. Descriptors
    /// that never start are recorded as `Cancelled`; running ones finish and
    /// teardown brackets of provisioned resources still run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Starts executing `plan` on the current tokio runtime.
    pub fn run(self, plan: RunPlan) -> RunHandle {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(RunPhase::Init);
        let completion = tokio::spawn(async move { self.execute(plan, results_tx, phase_tx).await });
        RunHandle {
            results: UnboundedReceiverStream::new(results_rx),
            phase: phase_rx,
            completion,
        }
    }

    async fn execute(
        self,
        plan: RunPlan,
        results: ResultSender,
        phase: watch::Sender<RunPhase>,
    ) -> Result<(), SchedulerError> {
        let (exclusive_tests, groups, brackets) = plan.into_parts();

        phase.send_replace(RunPhase::RunningShareable);
        info!(
            groups = groups.len(),
            workers = self.concurrency_limit,
            "starting shareable phase"
        );
        println!("\n{}", t!("run.phase_shareable", count = groups.len()).bold());
        self.run_shareable(groups, brackets, &results).await?;

        phase.send_replace(RunPhase::RunningExclusive);
        info!(tests = exclusive_tests.len(), "starting exclusive phase");
        println!("\n{}", t!("run.phase_exclusive", count = exclusive_tests.len()).bold());
        for descriptor in &exclusive_tests {
            let record = self.execute_or_cancel(descriptor).await;
            emit(&results, record);
        }

        phase.send_replace(RunPhase::Done);
        debug!("run finished");
        Ok(())
    }

    async fn run_shareable(
        &self,
        groups: BTreeMap<Configuration, Vec<TestDescriptor>>,
        mut brackets: BTreeMap<Configuration, BracketPair>,
        results: &ResultSender,
    ) -> Result<(), SchedulerError> {
        if groups.is_empty() {
            return Ok(());
        }

        let member_count: usize = groups.values().map(Vec::len).sum();
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for worker in 0..self.concurrency_limit.min(member_count.max(1)) {
            workers.spawn(worker_loop(
                worker,
                job_rx.clone(),
                self.env.clone(),
                results.clone(),
                self.cancel.clone(),
            ));
        }

        let drivers = join_all(groups.into_iter().map(|(configuration, members)| {
            let pair = brackets.remove(&configuration);
            self.drive_group(configuration, members, pair, job_tx.clone(), results.clone())
        }));
        tokio::pin!(drivers);

        loop {
            tokio::select! {
                _ = &mut drivers => break,
                Some(joined) = workers.join_next() => {
                    // Workers only return after the queue closes, so anything
                    // arriving here is a crash.
                    let reason = match joined {
                        Err(e) => e.to_string(),
                        Ok(()) => "worker exited while jobs were pending".to_string(),
                    };
                    error!(%reason, "shareable worker crashed, aborting run");
                    workers.abort_all();
                    return Err(SchedulerError::WorkerCrashed(reason));
                }
            }
        }

        // Closing the queue lets idle workers exit.
        drop(job_tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "shareable worker crashed while draining");
                workers.abort_all();
                return Err(SchedulerError::WorkerCrashed(e.to_string()));
            }
        }
        Ok(())
    }

    /// Runs one configuration's group: setup, members, teardown.
    async fn drive_group(
        &self,
        configuration: Configuration,
        members: Vec<TestDescriptor>,
        brackets: Option<BracketPair>,
        jobs: mpsc::UnboundedSender<Job>,
        results: ResultSender,
    ) {
        debug!(%configuration, members = members.len(), "driving shareable group");

        if let Some(pair) = &brackets {
            if self.cancel.is_cancelled() {
                for descriptor in std::iter::once(&pair.setup)
                    .chain(&members)
                    .chain(std::iter::once(&pair.teardown))
                {
                    emit(&results, cancelled(descriptor));
                }
                return;
            }

            let setup = execute_descriptor(&pair.setup, &self.env).await;
            let setup_error = setup.diagnostic.error.clone();
            let setup_failed = setup.is_failure();
            emit(&results, setup);

            if setup_failed {
                let error = setup_error.unwrap_or_default();
                println!(
                    "{}",
                    t!("run.bracket_setup_failed", config = configuration.token(), error = &error).red()
                );
                error!(%configuration, %error, "setup bracket failed, skipping group");
                for descriptor in &members {
                    emit(
                        &results,
                        ResultRecord::not_run(
                            descriptor,
                            FailureReason::BracketFailed,
                            format!("setup bracket for '{configuration}' failed: {error}"),
                        ),
                    );
                }
                // Clean up whatever the failed setup left behind.
                emit(&results, execute_descriptor(&pair.teardown, &self.env).await);
                return;
            }
        }

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let mut pending = 0usize;
        for descriptor in members {
            let job = Job {
                descriptor,
                done: done_tx.clone(),
            };
            match jobs.send(job) {
                Ok(()) => pending += 1,
                Err(mpsc::error::SendError(job)) => emit(&results, cancelled(&job.descriptor)),
            }
        }
        drop(done_tx);
        while pending > 0 && done_rx.recv().await.is_some() {
            pending -= 1;
        }

        if pending > 0 {
            // The shared resource is in an unknown state; leave it alone and
            // let the crashed worker fail the run.
            error!(%configuration, pending, "jobs lost to a crashed worker, skipping teardown");
            return;
        }

        if let Some(pair) = &brackets {
            emit(&results, execute_descriptor(&pair.teardown, &self.env).await);
        }
        debug!(%configuration, "shareable group drained");
    }

    async fn execute_or_cancel(&self, descriptor: &TestDescriptor) -> ResultRecord {
        if self.cancel.is_cancelled() {
            cancelled(descriptor)
        } else {
            execute_descriptor(descriptor, &self.env).await
        }
    }
}

/// Pulls jobs off the shared queue until it closes.
async fn worker_loop(
    worker: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    env: ExecutionEnv,
    results: ResultSender,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(job) = job else {
            break;
        };
        debug!(worker, test = %job.descriptor.label(), "picked up job");
        let record = if cancel.is_cancelled() {
            cancelled(&job.descriptor)
        } else {
            execute_descriptor(&job.descriptor, &env).await
        };
        emit(&results, record);
        let _ = job.done.send(());
    }
    debug!(worker, "worker finished");
}

fn cancelled(descriptor: &TestDescriptor) -> ResultRecord {
    ResultRecord::not_run(
        descriptor,
        FailureReason::Cancelled,
        "run was interrupted before this test started".to_string(),
    )
}

fn emit(results: &ResultSender, record: ResultRecord) {
    // A dropped receiver means nobody is listening any more; the run still
    // completes so that brackets get torn down.
    let _ = results.send(record);
}
