// src/exec/drain.rs

//! Event loop that drains a task graph through the worker pool.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cache::ArtifactCache;
use crate::errors::TaskFailure;
use crate::graph::registry::{GraphOptions, JoinSummary, upstream_failure};
use crate::graph::state::GraphState;
use crate::graph::task::{TaskFn, TaskMeta, TaskName, TaskOutcome};

use super::pool::{ExecEvent, WorkerPool};

/// Drains a set of registered tasks to completion.
///
/// Owns the pure [`GraphState`] machine, the artifact cache, the worker
/// pool and the completion-event channel. Constructed by
/// [`crate::graph::TaskGraph::join`]; not part of the public API.
pub struct DrainLoop {
    state: GraphState,
    metas: HashMap<TaskName, TaskMeta>,
    works: HashMap<TaskName, TaskFn>,
    cache: ArtifactCache,
    pool: WorkerPool,
    events_rx: mpsc::Receiver<ExecEvent>,
    report_interval: std::time::Duration,
    executed: Vec<TaskName>,
    skipped: Vec<TaskName>,
    failures: Vec<TaskFailure>,
}

impl DrainLoop {
    pub fn new(
        metas: Vec<TaskMeta>,
        works: HashMap<TaskName, TaskFn>,
        cache: ArtifactCache,
        options: &GraphOptions,
    ) -> Self {
        let state = GraphState::new(metas.iter());
        let (events_tx, events_rx) = mpsc::channel::<ExecEvent>(64);
        let pool = WorkerPool::new(options.jobs, events_tx);

        Self {
            state,
            metas: metas.into_iter().map(|m| (m.name.clone(), m)).collect(),
            works,
            cache,
            pool,
            events_rx,
            report_interval: options.report_interval,
            executed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Run until every task is terminal. Returns the summary plus all
    /// recorded failures (empty on full success).
    pub async fn run(mut self) -> (JoinSummary, Vec<TaskFailure>) {
        let mut ticker = tokio::time::interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the first report
        // comes after one full interval.
        ticker.tick().await;

        self.dispatch_ready();

        while !self.state.all_terminal() {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(ExecEvent::TaskFinished { task, outcome }) => {
                            self.on_finished(&task, outcome);
                            self.dispatch_ready();
                        }
                        None => {
                            // All senders dropped; nothing further can
                            // complete, so stop rather than hang.
                            warn!("executor event channel closed before graph was terminal");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.report_progress();
                }
            }
        }

        let summary = JoinSummary {
            executed: self.executed,
            skipped: self.skipped,
        };
        (summary, self.failures)
    }

    /// Dispatch every ready task, skipping those whose artifacts are up to
    /// date. Skipping may make dependents ready in turn, so loop until no
    /// skip occurred.
    fn dispatch_ready(&mut self) {
        loop {
            let ready = self.state.collect_ready();
            if ready.is_empty() {
                return;
            }

            let mut skipped_any = false;
            for name in ready {
                let Some(meta) = self.metas.get(&name) else {
                    warn!(task = %name, "ready task has no metadata; ignoring");
                    continue;
                };

                if self.cache.is_satisfied(meta) {
                    info!(task = %name, "target artifacts up to date; skipping");
                    self.state.mark_skipped(&name);
                    self.skipped.push(name);
                    skipped_any = true;
                } else if let Some(work) = self.works.remove(&name) {
                    info!(task = %name, "dispatching task");
                    self.pool.dispatch(name, work);
                } else {
                    warn!(task = %name, "task body already taken; ignoring");
                }
            }

            if !skipped_any {
                return;
            }
        }
    }

    fn on_finished(&mut self, task: &str, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success => {
                info!(task = %task, "task completed");
                if let Some(meta) = self.metas.get(task) {
                    self.cache.record_success(meta);
                }
                self.state.mark_succeeded(task);
                self.executed.push(task.to_string());
            }
            TaskOutcome::Failed(message) => {
                warn!(task = %task, error = %message, "task failed");
                self.failures.push(TaskFailure {
                    task: task.to_string(),
                    message,
                    upstream: false,
                });

                for dependent in self.state.mark_failed(task) {
                    warn!(
                        task = %dependent,
                        failed_dep = %task,
                        "task will not run due to upstream failure"
                    );
                    self.failures.push(upstream_failure(&dependent, task));
                }
            }
        }
    }

    fn report_progress(&self) {
        let counts = self.state.counts();
        info!(
            succeeded = counts.succeeded,
            skipped = counts.skipped,
            running = counts.running,
            pending = counts.pending,
            failed = counts.failed,
            "task graph progress"
        );
    }
}
