// src/graph/registry.rs

//! The task graph registry: `add_task` / `close` / `join` lifecycle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::cache::{ArtifactCache, CacheMode};
use crate::errors::{DemflowError, Result, TaskFailure};
use crate::exec::DrainLoop;
use crate::graph::task::{TaskMeta, TaskName, TaskSpec};

/// Name of the bookkeeping directory created inside the workspace.
pub const BOOKKEEPING_DIR: &str = ".demflow";

/// Options governing how a graph drains.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Maximum number of task bodies running at once. Must be at least 1.
    pub jobs: usize,
    /// How existing artifacts are judged up to date.
    pub cache_mode: CacheMode,
    /// Period between progress log lines while draining.
    pub report_interval: Duration,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cache_mode: CacheMode::ExistenceOnly,
            report_interval: Duration::from_secs(15),
        }
    }
}

/// Static description of a registered task, for `--dry-run` output.
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub name: TaskName,
    pub deps: Vec<TaskName>,
    pub target_paths: Vec<PathBuf>,
}

/// Summary returned by a successful [`TaskGraph::join`].
#[derive(Debug, Clone, Default)]
pub struct JoinSummary {
    /// Tasks whose bodies actually ran (in completion order).
    pub executed: Vec<TaskName>,
    /// Tasks skipped because their artifacts were already up to date.
    pub skipped: Vec<TaskName>,
}

/// A dependency-aware graph of idempotent, cacheable tasks.
///
/// Tasks are registered with `add_task`, registration is sealed with
/// `close`, and `join` drains the graph through a bounded worker pool,
/// skipping tasks whose declared outputs already exist.
pub struct TaskGraph {
    specs: Vec<TaskSpec>,
    names: HashMap<TaskName, usize>,
    options: GraphOptions,
    cache: ArtifactCache,
    closed: bool,
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.names.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl TaskGraph {
    /// Create a graph whose bookkeeping lives under
    /// `<workspace>/.demflow/`. The directory is created if absent.
    pub fn new(workspace: &Path, options: GraphOptions) -> Result<Self> {
        if options.jobs == 0 {
            return Err(DemflowError::Configuration(
                "worker count must be at least 1 (got 0)".to_string(),
            ));
        }

        let cache = ArtifactCache::new(workspace.join(BOOKKEEPING_DIR), options.cache_mode)?;

        Ok(Self {
            specs: Vec::new(),
            names: HashMap::new(),
            options,
            cache,
            closed: false,
        })
    }

    /// Register a task.
    ///
    /// Fails with [`DemflowError::GraphClosed`] after `close`, with
    /// [`DemflowError::DuplicateTask`] on a repeated name, and with
    /// [`DemflowError::UnknownDependency`] if a predecessor has not been
    /// registered yet. Requiring predecessors to pre-exist also makes
    /// self-references and cycles unrepresentable at registration time.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<TaskName> {
        if self.closed {
            return Err(DemflowError::GraphClosed);
        }
        if self.names.contains_key(&spec.name) {
            return Err(DemflowError::DuplicateTask(spec.name));
        }
        for dep in &spec.deps {
            if !self.names.contains_key(dep) {
                return Err(DemflowError::UnknownDependency {
                    task: spec.name.clone(),
                    dep: dep.clone(),
                });
            }
        }

        debug!(
            task = %spec.name,
            deps = ?spec.deps,
            targets = ?spec.target_paths,
            "registered task"
        );

        let name = spec.name.clone();
        self.names.insert(name.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(name)
    }

    /// Seal the graph: no further `add_task` calls are accepted.
    ///
    /// Re-validates acyclicity over the whole graph; with the registration
    /// rules above this cannot fail, but the check is cheap and keeps `join`
    /// honest if registration rules ever loosen.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.validate_acyclic()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Static descriptions of all registered tasks, in registration order.
    pub fn describe(&self) -> Vec<TaskDescription> {
        self.specs
            .iter()
            .map(|s| TaskDescription {
                name: s.name.clone(),
                deps: s.deps.clone(),
                target_paths: s.target_paths.clone(),
            })
            .collect()
    }

    /// Drain the graph to completion.
    ///
    /// Blocks (asynchronously) until every task is terminal, or until
    /// `timeout` elapses. A timeout stops the wait but does not cancel
    /// task bodies already running on worker threads.
    ///
    /// On any task failure the error carries every recorded failure,
    /// including dependents that were skipped because of an upstream
    /// failure.
    pub async fn join(mut self, timeout: Option<Duration>) -> Result<JoinSummary> {
        if !self.closed {
            debug!("join called on an unclosed graph; closing implicitly");
            self.close()?;
        }

        let metas: Vec<TaskMeta> = self.specs.iter().map(TaskMeta::from_spec).collect();
        let works = self
            .specs
            .into_iter()
            .map(|s| (s.name.clone(), s.work))
            .collect();

        info!(
            tasks = metas.len(),
            jobs = self.options.jobs,
            "draining task graph"
        );

        let drain = DrainLoop::new(metas, works, self.cache, &self.options);

        let outcome = match timeout {
            Some(t) => tokio::time::timeout(t, drain.run())
                .await
                .map_err(|_| DemflowError::JoinTimeout)?,
            None => drain.run().await,
        };

        let (summary, failures) = outcome;
        if failures.is_empty() {
            info!(
                executed = summary.executed.len(),
                skipped = summary.skipped.len(),
                "task graph drained successfully"
            );
            Ok(summary)
        } else {
            Err(DemflowError::ExecutionFailed { failures })
        }
    }

    fn validate_acyclic(&self) -> Result<()> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for spec in &self.specs {
            graph.add_node(spec.name.as_str());
        }
        for spec in &self.specs {
            for dep in &spec.deps {
                graph.add_edge(dep.as_str(), spec.name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(DemflowError::Cycle(cycle.node_id().to_string())),
        }
    }
}

/// Collect upstream-failure entries into [`TaskFailure`] records.
pub(crate) fn upstream_failure(task: &str, failed_dep: &str) -> TaskFailure {
    TaskFailure {
        task: task.to_string(),
        message: format!("upstream task '{failed_dep}' failed"),
        upstream: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::task::TaskSpec;

    fn noop(name: &str) -> TaskSpec {
        TaskSpec::new(name, Box::new(|| Ok(())))
    }

    fn graph(dir: &Path) -> TaskGraph {
        TaskGraph::new(dir, GraphOptions::default()).expect("graph construction")
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());

        g.add_task(noop("warp")).unwrap();
        let err = g.add_task(noop("warp")).unwrap_err();
        assert!(matches!(err, DemflowError::DuplicateTask(name) if name == "warp"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());

        let err = g.add_task(noop("b").after("a")).unwrap_err();
        assert!(matches!(
            err,
            DemflowError::UnknownDependency { task, dep } if task == "b" && dep == "a"
        ));
    }

    #[test]
    fn self_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());

        let err = g.add_task(noop("a").after("a")).unwrap_err();
        assert!(matches!(err, DemflowError::UnknownDependency { .. }));
    }

    #[test]
    fn closed_graph_rejects_registration() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path());

        g.add_task(noop("a")).unwrap();
        g.close().unwrap();
        let err = g.add_task(noop("b")).unwrap_err();
        assert!(matches!(err, DemflowError::GraphClosed));
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = GraphOptions {
            jobs: 0,
            ..GraphOptions::default()
        };
        let err = TaskGraph::new(dir.path(), options).unwrap_err();
        assert!(matches!(err, DemflowError::Configuration(_)));
    }

    #[test]
    fn bookkeeping_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let _g = graph(dir.path());
        assert!(dir.path().join(BOOKKEEPING_DIR).is_dir());
    }

    #[tokio::test]
    async fn empty_graph_joins_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path());
        let summary = g.join(None).await.unwrap();
        assert!(summary.executed.is_empty());
        assert!(summary.skipped.is_empty());
    }
}
