// src/errors.rs

//! Crate-wide error types and helpers.

use thiserror::Error;

/// A single task failure recorded during a graph run.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// Name of the task that failed (or was skipped due to a failed
    /// predecessor).
    pub task: String,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// True if this task never ran because a predecessor failed.
    pub upstream: bool,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.upstream {
            write!(f, "{} (not run: {})", self.task, self.message)
        } else {
            write!(f, "{}: {}", self.task, self.message)
        }
    }
}

#[derive(Error, Debug)]
pub enum DemflowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dep}'")]
    UnknownDependency { task: String, dep: String },

    #[error("Task graph is closed; no further tasks may be added")]
    GraphClosed,

    #[error("Cycle detected in task graph involving '{0}'")]
    Cycle(String),

    #[error("Timed out waiting for the task graph to drain")]
    JoinTimeout,

    #[error("{} task(s) failed: [{}]", failures.len(), format_failures(failures))]
    ExecutionFailed { failures: Vec<TaskFailure> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, DemflowError>;
