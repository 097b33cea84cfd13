// src/graph/task.rs

//! Task model: a named unit of work with declared outputs and predecessors.

use std::path::PathBuf;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// The work a task performs when dispatched to a worker slot.
///
/// Task bodies are blocking by design: the pipeline's stages are long-running
/// external processes and file IO. The worker pool runs them on blocking
/// threads.
pub type TaskFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// A task registration: identity, work, declared outputs and predecessors.
pub struct TaskSpec {
    /// Unique name within the graph.
    pub name: TaskName,
    /// The callable to run when the task is dispatched.
    pub work: TaskFn,
    /// Output paths this task promises to produce. Existence of all of them
    /// is the completion signal used by the artifact cache; a task with no
    /// target paths always runs.
    pub target_paths: Vec<PathBuf>,
    /// Names of tasks that must complete before this one may run.
    pub deps: Vec<TaskName>,
    /// Optional parameter string fingerprinted for cache invalidation.
    pub fingerprint: Option<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>, work: TaskFn) -> Self {
        Self {
            name: name.into(),
            work,
            target_paths: Vec::new(),
            deps: Vec::new(),
            fingerprint: None,
        }
    }

    pub fn target(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_paths.push(path.into());
        self
    }

    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn fingerprint(mut self, params: impl Into<String>) -> Self {
        self.fingerprint = Some(params.into());
        self
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("target_paths", &self.target_paths)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// The non-callable part of a [`TaskSpec`], kept around during execution for
/// cache checks and diagnostics.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub name: TaskName,
    pub target_paths: Vec<PathBuf>,
    pub deps: Vec<TaskName>,
    pub fingerprint: Option<String>,
}

impl TaskMeta {
    pub fn from_spec(spec: &TaskSpec) -> Self {
        Self {
            name: spec.name.clone(),
            target_paths: spec.target_paths.clone(),
            deps: spec.deps.clone(),
            fingerprint: spec.fingerprint.clone(),
        }
    }
}

/// Outcome of a task body for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}
