// src/exec/pool.rs

//! Bounded worker pool for blocking task bodies.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::debug;

use crate::graph::task::{TaskFn, TaskName, TaskOutcome};

/// Event emitted by the pool when a task body finishes.
#[derive(Debug, Clone)]
pub enum ExecEvent {
    TaskFinished {
        task: TaskName,
        outcome: TaskOutcome,
    },
}

/// Executes task bodies on `spawn_blocking` threads, at most `jobs` at a
/// time. Outcomes flow back over the event channel handed in at
/// construction.
///
/// The pool never retries and never cancels: once a body starts it runs to
/// completion, and its side effects are exactly the side effects of the
/// closure.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    events_tx: mpsc::Sender<ExecEvent>,
}

impl WorkerPool {
    pub fn new(jobs: usize, events_tx: mpsc::Sender<ExecEvent>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(jobs)),
            events_tx,
        }
    }

    /// Dispatch one task body. Returns immediately; the body runs once a
    /// worker slot frees up.
    pub fn dispatch(&self, task: TaskName, work: TaskFn) {
        let semaphore = Arc::clone(&self.semaphore);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: the pool is being torn down.
                    let _ = events_tx
                        .send(ExecEvent::TaskFinished {
                            task,
                            outcome: TaskOutcome::Failed(
                                "worker pool shut down before task could run".to_string(),
                            ),
                        })
                        .await;
                    return;
                }
            };

            debug!(task = %task, "worker slot acquired; running task body");

            let span_task = task.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let span = tracing::info_span!("task", name = %span_task);
                let _entered = span.enter();
                work()
            })
            .await;

            let outcome = match joined {
                Ok(Ok(())) => TaskOutcome::Success,
                Ok(Err(err)) => TaskOutcome::Failed(format!("{err:#}")),
                Err(join_err) if join_err.is_panic() => {
                    TaskOutcome::Failed("task body panicked".to_string())
                }
                Err(_) => TaskOutcome::Failed("task body was cancelled".to_string()),
            };

            let _ = events_tx
                .send(ExecEvent::TaskFinished { task, outcome })
                .await;
        });
    }
}
