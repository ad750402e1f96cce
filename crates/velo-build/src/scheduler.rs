//! Parallel build scheduler
//!
//! Executes dirty targets in dependency order with a bounded worker pool.
//! The control loop owns all graph bookkeeping (ready set, per-target
//! remaining-dependency counts, statuses); workers only receive a target
//! name over a channel, run the build, and send a structured result back.
//! Nothing else is shared, so the at-most-once guarantee falls out of the
//! single-threaded dispatch: a target leaves the ready set exactly once.
//!
//! Failure handling:
//! - fail-fast: after the first failure nothing new is dispatched;
//!   in-flight builds run to completion; the failed target's transitive
//!   dependents are reported as not built.
//! - keep-going: a failed target never releases its dependents, so that
//!   subgraph is quarantined while independent targets continue.
//!
//! Cancellation is cooperative: the flag is observed between dispatches,
//! in-flight work completes, and nothing is recorded for work that never
//! started.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::graph::DependencyGraph;
use crate::progress::ProgressObserver;

/// What to do when a target fails to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop dispatching after the first failure
    #[default]
    FailFast,
    /// Keep building independent subgraphs; quarantine dependents of failures
    KeepGoing,
}

/// Final state of one target after a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Built successfully this run
    Built,
    /// Build command failed
    Failed,
    /// Clean; never dispatched
    Skipped,
    /// Dirty but never started (failed dependency or fail-fast shutdown)
    NotBuilt,
    /// Dirty but never started because the run was cancelled
    Cancelled,
}

/// Result of building one target
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub success: bool,
    /// Compiler stderr, reported verbatim on failure
    pub stderr: String,
    pub duration: Duration,
}

impl TargetOutcome {
    pub fn ok(duration: Duration) -> Self {
        Self {
            success: true,
            stderr: String::new(),
            duration,
        }
    }

    pub fn failed(stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            duration,
        }
    }
}

/// Executes the actual build of one target; implemented by the driver
/// (compile + record) and by test fakes. Must not hold state locks across
/// the underlying compiler process.
pub trait TargetBuilder: Send + Sync {
    fn build_target(&self, name: &str) -> TargetOutcome;
}

/// Aggregate result of a scheduler run
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    /// Final status per target, every graph node present
    pub statuses: BTreeMap<String, TargetStatus>,
    /// (target, stderr) for each failed build, in completion order
    pub failures: Vec<(String, String)>,
    /// (target, duration) for each executed build, in completion order
    pub target_times: Vec<(String, Duration)>,
    /// Whether the run observed the cancellation flag
    pub cancelled: bool,
}

impl ScheduleOutcome {
    pub fn count(&self, status: TargetStatus) -> usize {
        self.statuses.values().filter(|&&s| s == status).count()
    }

    pub fn built(&self) -> usize {
        self.count(TargetStatus::Built)
    }

    pub fn failed(&self) -> usize {
        self.count(TargetStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TargetStatus::Skipped)
    }

    pub fn success(&self) -> bool {
        !self.cancelled
            && self.failures.is_empty()
            && self.count(TargetStatus::NotBuilt) == 0
            && self.count(TargetStatus::Cancelled) == 0
    }
}

/// Dependency-ordered, bounded-concurrency executor
pub struct Scheduler<'g> {
    graph: &'g DependencyGraph,
    dirty: BTreeSet<String>,
    workers: usize,
    policy: FailurePolicy,
    cancel: Arc<AtomicBool>,
}

impl<'g> Scheduler<'g> {
    /// Create a scheduler for the given dirty set. The set is closed under
    /// reverse edges here, so passing just the initially dirty targets is
    /// fine.
    pub fn new(graph: &'g DependencyGraph, dirty: BTreeSet<String>, workers: usize) -> Self {
        Self {
            dirty: graph.dirty_closure(&dirty),
            graph,
            workers: workers.max(1),
            policy: FailurePolicy::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The dirty set after propagation
    pub fn dirty_set(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Run every dirty target through the builder, respecting dependency
    /// order and the worker budget.
    pub fn run(
        &self,
        builder: &dyn TargetBuilder,
        observer: &dyn ProgressObserver,
    ) -> ScheduleOutcome {
        let mut outcome = ScheduleOutcome::default();

        // clean targets contribute ordering but are never dispatched
        for name in self.graph.order() {
            if !self.dirty.contains(name) {
                outcome.statuses.insert(name.clone(), TargetStatus::Skipped);
            }
        }

        // remaining_deps counts only edges into the dirty set
        let mut remaining: HashMap<&str, usize> = self
            .dirty
            .iter()
            .map(|name| {
                let count = self
                    .graph
                    .dependencies(name)
                    .iter()
                    .filter(|dep| self.dirty.contains(dep.as_str()))
                    .count();
                (name.as_str(), count)
            })
            .collect();

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&name, _)| name)
            .collect();

        info!(
            dirty = self.dirty.len(),
            workers = self.workers,
            "executing build plan"
        );

        let mut terminating = false;
        let mut in_flight = 0usize;

        thread::scope(|scope| {
            let (job_tx, job_rx) = mpsc::channel::<String>();
            let job_rx = Arc::new(Mutex::new(job_rx));
            let (result_tx, result_rx) = mpsc::channel::<(String, TargetOutcome)>();

            for _ in 0..self.workers {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                scope.spawn(move || loop {
                    // release the receiver lock before building
                    let job = job_rx.lock().unwrap().recv();
                    let Ok(name) = job else { return };
                    let result = builder.build_target(&name);
                    if result_tx.send((name, result)).is_err() {
                        return;
                    }
                });
            }
            drop(result_tx);

            loop {
                // dispatch up to the worker budget, unless shutting down;
                // popping under the single control loop is the only
                // ready -> in-flight transition
                while in_flight < self.workers
                    && !terminating
                    && !self.cancel.load(Ordering::SeqCst)
                {
                    let Some(name) = ready.pop_first() else { break };
                    debug!(target = name, "dispatching");
                    observer.target_started(name);
                    job_tx.send(name.to_string()).expect("workers outlive dispatch");
                    in_flight += 1;
                }

                if in_flight == 0 {
                    break;
                }

                let (name, result) = result_rx.recv().expect("in-flight worker sends a result");
                in_flight -= 1;
                observer.target_finished(&name, result.success, result.duration);
                outcome.target_times.push((name.clone(), result.duration));

                if result.success {
                    outcome.statuses.insert(name.clone(), TargetStatus::Built);
                    for dependent in self.graph.dependents(&name) {
                        if let Some(count) = remaining.get_mut(dependent.as_str()) {
                            *count -= 1;
                            if *count == 0 {
                                ready.insert(dependent.as_str());
                            }
                        }
                    }
                } else {
                    debug!(target = %name, "build failed");
                    outcome.statuses.insert(name.clone(), TargetStatus::Failed);
                    outcome.failures.push((name, result.stderr));
                    if self.policy == FailurePolicy::FailFast {
                        terminating = true;
                    }
                    // keep-going: dependents stay quarantined because the
                    // failed target never decrements their counts
                }
            }

            drop(job_tx);
        });

        outcome.cancelled = self.cancel.load(Ordering::SeqCst);
        let leftover_status = if outcome.cancelled {
            TargetStatus::Cancelled
        } else {
            TargetStatus::NotBuilt
        };
        for name in &self.dirty {
            outcome
                .statuses
                .entry(name.clone())
                .or_insert(leftover_status);
        }

        outcome
    }
}
