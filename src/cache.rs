// src/cache.rs

//! Artifact cache: decides whether a task's declared outputs are up to date.
//!
//! Existence of all declared target paths is the authoritative completion
//! signal; there is no separate persisted run state. `Fingerprint` mode
//! additionally records a blake3 hash of the task's parameter string in the
//! bookkeeping directory, so re-runs with changed parameters recompute even
//! when the outputs exist.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::graph::task::TaskMeta;

/// How an existing artifact set is judged up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Outputs existing on disk is sufficient. This matches the behaviour of
    /// the original field scripts, which never inspect content.
    #[default]
    ExistenceOnly,
    /// Outputs must exist *and* the recorded parameter fingerprint must match.
    Fingerprint,
}

#[derive(Debug)]
pub struct ArtifactCache {
    mode: CacheMode,
    dir: PathBuf,
}

impl ArtifactCache {
    /// Create the cache rooted at the given bookkeeping directory, creating
    /// the directory if needed.
    pub fn new(dir: PathBuf, mode: CacheMode) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { mode, dir })
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// True if the task can be skipped without running its body.
    ///
    /// A task with no declared target paths is never satisfied: there is
    /// nothing to check, so it always runs. A task that crashed after
    /// producing only some of its outputs is also not satisfied and will be
    /// re-executed from scratch.
    pub fn is_satisfied(&self, task: &TaskMeta) -> bool {
        if task.target_paths.is_empty() {
            return false;
        }
        if !task.target_paths.iter().all(|p| p.exists()) {
            return false;
        }

        match self.mode {
            CacheMode::ExistenceOnly => true,
            CacheMode::Fingerprint => self.fingerprint_matches(task),
        }
    }

    /// Record bookkeeping for a successfully completed task.
    ///
    /// Written in every mode so that switching a workspace to `Fingerprint`
    /// later does not invalidate work already done.
    pub fn record_success(&self, task: &TaskMeta) {
        let Some(params) = &task.fingerprint else {
            return;
        };

        let digest = blake3::hash(params.as_bytes()).to_hex().to_string();
        let path = self.fingerprint_path(&task.name);
        if let Err(err) = fs::write(&path, &digest) {
            // Bookkeeping is best-effort; artifacts on disk remain the
            // completion signal.
            warn!(task = %task.name, error = %err, "failed to write fingerprint record");
        }
    }

    fn fingerprint_matches(&self, task: &TaskMeta) -> bool {
        let Some(params) = &task.fingerprint else {
            // No parameters declared: fall back to existence.
            return true;
        };

        let expected = blake3::hash(params.as_bytes()).to_hex().to_string();
        match fs::read_to_string(self.fingerprint_path(&task.name)) {
            Ok(recorded) if recorded.trim() == expected => true,
            Ok(_) => {
                debug!(task = %task.name, "parameter fingerprint changed; invalidating");
                false
            }
            Err(_) => {
                debug!(task = %task.name, "no recorded fingerprint; invalidating");
                false
            }
        }
    }

    fn fingerprint_path(&self, task_name: &str) -> PathBuf {
        // Task names are simple identifiers, but sanitise anyway.
        let safe: String = task_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.fp"))
    }
}
