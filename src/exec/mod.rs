// src/exec/mod.rs

//! Async execution shell around the pure graph state machine.
//!
//! - [`pool`] is the bounded worker pool that runs task bodies on blocking
//!   threads and reports outcomes over a channel.
//! - [`drain`] is the event loop that dispatches ready tasks (consulting the
//!   artifact cache) and reacts to completions until the graph is terminal.

pub mod drain;
pub mod pool;

pub use drain::DrainLoop;
pub use pool::{ExecEvent, WorkerPool};
