// src/graph/mod.rs

//! Task graph representation and run-state tracking.
//!
//! - [`task`] defines the task model: a named unit of work with declared
//!   output paths and predecessor tasks.
//! - [`registry`] holds the [`TaskGraph`] with its `add_task` / `close` /
//!   `join` lifecycle.
//! - [`state`] contains the pure per-run state machine that decides which
//!   tasks are ready and how failures propagate to dependents.

pub mod registry;
pub mod state;
pub mod task;

pub use registry::{GraphOptions, JoinSummary, TaskGraph};
pub use state::{GraphState, RunState, StateCounts};
pub use task::{TaskFn, TaskMeta, TaskName, TaskOutcome, TaskSpec};
