// src/graph/state.rs

//! Pure per-run state machine for the task graph.
//!
//! This module has no Tokio types, channels or IO; it owns the readiness and
//! failure-propagation semantics and is driven by the async shell in
//! [`crate::exec`]. Tests can step it deterministically.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::graph::task::{TaskMeta, TaskName};

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on predecessors.
    Pending,
    /// Claimed by the executor (dispatched to a worker or being cache-checked).
    Running,
    /// Task body ran and succeeded.
    DoneSuccess,
    /// Task body failed, or a predecessor failed so this task never ran.
    DoneFailed,
    /// All declared artifacts were already present; the body was never
    /// invoked.
    SkippedUpToDate,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::DoneSuccess | RunState::DoneFailed | RunState::SkippedUpToDate
        )
    }

    /// Whether a dependency in this state satisfies its dependents.
    fn satisfies_dependents(self) -> bool {
        matches!(self, RunState::DoneSuccess | RunState::SkippedUpToDate)
    }
}

/// Counts of tasks per state, for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
struct Node {
    deps: Vec<TaskName>,
    dependents: Vec<TaskName>,
    state: RunState,
}

/// Mutable run state for every task in a graph.
#[derive(Debug)]
pub struct GraphState {
    nodes: HashMap<TaskName, Node>,
}

impl GraphState {
    /// Build the state table from task metadata. All tasks start `Pending`.
    pub fn new<'a>(metas: impl IntoIterator<Item = &'a TaskMeta>) -> Self {
        let mut nodes: HashMap<TaskName, Node> = HashMap::new();

        for meta in metas {
            nodes.insert(
                meta.name.clone(),
                Node {
                    deps: meta.deps.clone(),
                    dependents: Vec::new(),
                    state: RunState::Pending,
                },
            );
        }

        // Second pass: populate dependents from deps.
        let names: Vec<TaskName> = nodes.keys().cloned().collect();
        for name in names {
            let deps = nodes
                .get(&name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Current state of a task, if known.
    pub fn state_of(&self, task: &str) -> Option<RunState> {
        self.nodes.get(task).map(|n| n.state)
    }

    /// Collect `Pending` tasks whose predecessors are all satisfied, mark
    /// them `Running` and return their names (sorted for determinism).
    pub fn collect_ready(&mut self) -> Vec<TaskName> {
        let mut ready: Vec<TaskName> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.state == RunState::Pending && self.deps_satisfied(node))
            .map(|(name, _)| name.clone())
            .collect();
        ready.sort();

        for name in &ready {
            if let Some(node) = self.nodes.get_mut(name) {
                debug!(task = %name, "dependencies satisfied; marking Running");
                node.state = RunState::Running;
            }
        }

        ready
    }

    fn deps_satisfied(&self, node: &Node) -> bool {
        node.deps.iter().all(|dep| match self.nodes.get(dep) {
            Some(d) => d.state.satisfies_dependents(),
            None => {
                // Registration forbids unknown deps; be defensive anyway.
                warn!(dep = %dep, "dependency missing from state table");
                false
            }
        })
    }

    /// Mark a claimed task as skipped because its artifacts are up to date.
    pub fn mark_skipped(&mut self, task: &str) {
        self.set_state(task, RunState::SkippedUpToDate);
    }

    /// Mark a task's body as having completed successfully.
    pub fn mark_succeeded(&mut self, task: &str) {
        self.set_state(task, RunState::DoneSuccess);
    }

    /// Mark a task as failed and propagate the failure to every transitive
    /// dependent that has not already reached a terminal state.
    ///
    /// Returns the dependents that were newly failed (the root task is not
    /// included).
    pub fn mark_failed(&mut self, task: &str) -> Vec<TaskName> {
        self.set_state(task, RunState::DoneFailed);

        let mut stack: Vec<TaskName> = self
            .nodes
            .get(task)
            .map(|n| n.dependents.clone())
            .unwrap_or_default();
        let mut newly_failed = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&name) {
                if node.state == RunState::Pending {
                    node.state = RunState::DoneFailed;
                    debug!(task = %name, "failing dependent due to upstream failure");
                    newly_failed.push(name.clone());
                    stack.extend(node.dependents.iter().cloned());
                }
            }
        }

        newly_failed
    }

    /// True once every task is in a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|n| n.state.is_terminal())
    }

    /// True if any task ended in `DoneFailed`.
    pub fn any_failed(&self) -> bool {
        self.nodes
            .values()
            .any(|n| n.state == RunState::DoneFailed)
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for node in self.nodes.values() {
            match node.state {
                RunState::Pending => counts.pending += 1,
                RunState::Running => counts.running += 1,
                RunState::DoneSuccess => counts.succeeded += 1,
                RunState::DoneFailed => counts.failed += 1,
                RunState::SkippedUpToDate => counts.skipped += 1,
            }
        }
        counts
    }

    fn set_state(&mut self, task: &str, state: RunState) {
        match self.nodes.get_mut(task) {
            Some(node) => node.state = state,
            None => warn!(task = %task, ?state, "state change for unknown task; ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, deps: &[&str]) -> TaskMeta {
        TaskMeta {
            name: name.to_string(),
            target_paths: Vec::new(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            fingerprint: None,
        }
    }

    #[test]
    fn roots_are_ready_first() {
        let metas = vec![meta("a", &[]), meta("b", &["a"]), meta("c", &["b"])];
        let mut state = GraphState::new(&metas);

        assert_eq!(state.collect_ready(), vec!["a".to_string()]);
        // Nothing else becomes ready until `a` finishes.
        assert!(state.collect_ready().is_empty());

        state.mark_succeeded("a");
        assert_eq!(state.collect_ready(), vec!["b".to_string()]);
    }

    #[test]
    fn skipped_satisfies_dependents() {
        let metas = vec![meta("a", &[]), meta("b", &["a"])];
        let mut state = GraphState::new(&metas);

        state.collect_ready();
        state.mark_skipped("a");
        assert_eq!(state.collect_ready(), vec!["b".to_string()]);
    }

    #[test]
    fn diamond_fan_in_waits_for_both_arms() {
        let metas = vec![
            meta("src", &[]),
            meta("left", &["src"]),
            meta("right", &["src"]),
            meta("sink", &["left", "right"]),
        ];
        let mut state = GraphState::new(&metas);

        assert_eq!(state.collect_ready(), vec!["src".to_string()]);
        state.mark_succeeded("src");
        assert_eq!(
            state.collect_ready(),
            vec!["left".to_string(), "right".to_string()]
        );

        state.mark_succeeded("left");
        assert!(state.collect_ready().is_empty());

        state.mark_succeeded("right");
        assert_eq!(state.collect_ready(), vec!["sink".to_string()]);
    }

    #[test]
    fn failure_fails_transitive_dependents() {
        let metas = vec![
            meta("a", &[]),
            meta("b", &["a"]),
            meta("c", &["b"]),
            meta("d", &["b"]),
            meta("unrelated", &[]),
        ];
        let mut state = GraphState::new(&metas);

        state.collect_ready();
        let mut failed = state.mark_failed("a");
        failed.sort();
        assert_eq!(
            failed,
            vec!["b".to_string(), "c".to_string(), "d".to_string()]
        );

        // The unrelated root is untouched and still runnable.
        assert_eq!(state.state_of("unrelated"), Some(RunState::Running));
        state.mark_succeeded("unrelated");
        assert!(state.all_terminal());
        assert!(state.any_failed());
    }

    #[test]
    fn counts_track_states() {
        let metas = vec![meta("a", &[]), meta("b", &["a"])];
        let mut state = GraphState::new(&metas);

        state.collect_ready();
        assert_eq!(state.counts().running, 1);
        assert_eq!(state.counts().pending, 1);

        state.mark_succeeded("a");
        state.collect_ready();
        state.mark_skipped("b");

        let counts = state.counts();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.skipped, 1);
        assert!(state.all_terminal());
        assert!(!state.any_failed());
    }
}
