// tests/property_drain.rs

//! Property tests for the pure graph state machine: any acyclic dependency
//! structure with any pattern of failures drains to a fully terminal state.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use demflow::graph::{GraphState, RunState, TaskMeta};

/// Generate the dependency lists of an acyclic graph: task `i` may only
/// depend on tasks `0..i`.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            move |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, potential)| {
                        let mut deps: Vec<usize> = potential
                            .into_iter()
                            .filter(|_| i > 0)
                            .map(|d| d % i.max(1))
                            .collect::<HashSet<_>>()
                            .into_iter()
                            .collect();
                        deps.sort_unstable();
                        deps
                    })
                    .collect()
            },
        )
    })
}

fn metas_from(deps: &[Vec<usize>]) -> Vec<TaskMeta> {
    deps.iter()
        .enumerate()
        .map(|(i, d)| TaskMeta {
            name: format!("task_{i}"),
            target_paths: Vec::new(),
            deps: d.iter().map(|j| format!("task_{j}")).collect(),
            fingerprint: None,
        })
        .collect()
}

proptest! {
    #[test]
    fn any_dag_with_any_failures_drains_to_terminal(
        deps in dag_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..6),
    ) {
        let metas = metas_from(&deps);
        let mut state = GraphState::new(&metas);

        let failing: HashSet<String> = failing
            .into_iter()
            .filter(|&i| i < metas.len())
            .map(|i| format!("task_{i}"))
            .collect();

        // Resolve every ready batch immediately; bounded to catch livelock.
        let mut steps = 0;
        loop {
            let ready = state.collect_ready();
            if ready.is_empty() {
                break;
            }
            for task in ready {
                if failing.contains(&task) {
                    state.mark_failed(&task);
                } else {
                    state.mark_succeeded(&task);
                }
            }
            steps += 1;
            prop_assert!(steps <= metas.len() + 1, "drain did not terminate");
        }

        prop_assert!(state.all_terminal());

        // Success requires every predecessor to have succeeded; any task
        // downstream of a failure must itself be failed.
        let states: HashMap<String, RunState> = metas
            .iter()
            .map(|m| (m.name.clone(), state.state_of(&m.name).unwrap()))
            .collect();

        for meta in &metas {
            let own = states[&meta.name];
            let deps_ok = meta.deps.iter().all(|d| states[d] == RunState::DoneSuccess);
            if failing.contains(&meta.name) || !deps_ok {
                prop_assert_eq!(own, RunState::DoneFailed);
            } else {
                prop_assert_eq!(own, RunState::DoneSuccess);
            }
        }
    }
}
