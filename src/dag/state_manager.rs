// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::dag::DagGraph;
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Include a triggered task and its downstream dependents in this run.
    ///
    /// Dependents are skipped when they are group tasks (groups only run
    /// when asked for by name) or when one of their other dependencies can
    /// never be satisfied in this run (not part of it and never succeeded,
    /// or already failed). Without that pruning such a dependent would sit
    /// in `Pending` forever and the run would never finish.
    ///
    /// The root itself is skipped when one of its dependencies has never
    /// succeeded and is not part of this run.
    pub fn mark_task_and_dependents_pending(&mut self, root: &str) {
        let unbuilt_dep = self.graph.dependencies_of(root).iter().find(|dep| {
            self.tasks
                .get(dep.as_str())
                .is_some_and(|d| d.run_state.is_none() && d.last_successful_run.is_none())
        });
        if let Some(dep) = unbuilt_dep {
            warn!(task = %root, dep = %dep, "dependency has not been built yet; skipping trigger");
            return;
        }

        let mut selected: BTreeSet<TaskName> = BTreeSet::new();
        let mut stack: Vec<TaskName> = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            if selected.contains(&name) {
                continue;
            }
            let Some(info) = self.tasks.get(&name) else {
                warn!(task = %name, "node in DAG not present in tasks map");
                continue;
            };
            if name != root && info.action.is_group() {
                continue;
            }
            selected.insert(name.clone());
            stack.extend(self.graph.dependents_of(&name).iter().cloned());
        }

        // Drop dependents that could never become ready; repeat until stable
        // because removing one can strand its own dependents.
        loop {
            let stranded: Vec<TaskName> = selected
                .iter()
                .filter(|name| name.as_str() != root)
                .filter(|name| {
                    self.graph.dependencies_of(name).iter().any(|dep| {
                        if selected.contains(dep) {
                            return matches!(
                                self.tasks.get(dep).and_then(|d| d.run_state),
                                Some(RunState::DoneFailed)
                            );
                        }
                        !self
                            .tasks
                            .get(dep)
                            .map(TaskInfo::can_satisfy_dependents)
                            .unwrap_or(false)
                    })
                })
                .cloned()
                .collect();

            if stranded.is_empty() {
                break;
            }
            for name in stranded {
                debug!(task = %name, "dependent left out of run; a dependency cannot succeed");
                selected.remove(&name);
            }
        }

        self.mark_pending(selected);
    }

    /// Include `target` and every transitive predecessor in this run.
    ///
    /// This is how an explicitly requested task runs: its whole upstream
    /// closure executes, nothing downstream of it does.
    pub fn mark_closure_pending(&mut self, target: &str) {
        let closure = self.graph.upstream_closure(target);
        self.mark_pending(closure);
    }

    fn mark_pending(&mut self, names: impl IntoIterator<Item = TaskName>) {
        for name in names {
            if let Some(info) = self.tasks.get_mut(&name) {
                if info.run_state.is_none() {
                    info.run_state = Some(RunState::Pending);
                    debug!(task = %info.name, "marked Pending for this run");
                }
            }
        }
    }

    /// Mark all *triggered* dependents (and their transitively triggered
    /// dependents) of a failed task as `DoneFailed` for this run.
    ///
    /// Returns the list of tasks that were newly marked as failed (excluding
    /// the root task; the caller should add that separately if desired).
    pub fn mark_dependents_failed(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self
            .graph
            .dependents_of(failed_task)
            .iter()
            .cloned()
            .collect();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut newly_failed = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(info) = self.tasks.get_mut(&name) {
                if matches!(info.run_state, Some(RunState::Pending)) {
                    info.run_state = Some(RunState::DoneFailed);
                    debug!(
                        task = %info.name,
                        "marking dependent as DoneFailed due to upstream failure"
                    );
                    newly_failed.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }

        newly_failed
    }

    /// Fail every `Pending` task that has a dependency already failed in
    /// this run. Needed when a task joins a run after its dependency failed.
    pub fn fail_blocked_tasks(&mut self) -> Vec<TaskName> {
        let blocked: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| matches!(info.run_state, Some(RunState::Pending)))
            .filter(|info| {
                info.deps.iter().any(|dep| {
                    matches!(
                        self.tasks.get(dep).and_then(|d| d.run_state),
                        Some(RunState::DoneFailed)
                    )
                })
            })
            .map(|info| info.name.clone())
            .collect();

        let mut newly_failed = Vec::new();
        for name in blocked {
            if let Some(info) = self.tasks.get_mut(&name) {
                info.run_state = Some(RunState::DoneFailed);
                newly_failed.push(name.clone());
            }
            newly_failed.extend(self.mark_dependents_failed(&name));
        }
        newly_failed
    }

    /// Collect tasks that are `Pending` and whose dependencies are satisfied,
    /// mark them as `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut ready = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskName> = {
            let ro = ReadOnlyStateManager::new(self.tasks);
            self.tasks
                .values()
                .filter(|info| {
                    matches!(info.run_state, Some(RunState::Pending))
                        && ro.deps_satisfied_for_info(info)
                })
                .map(|info| info.name.clone())
                .collect()
        };

        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                let is_rerun = info.last_successful_run.is_some() || info.last_failed_run.is_some();

                if is_rerun {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for re-run in this DAG run"
                    );
                } else {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for first run in this DAG run"
                    );
                }

                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::from_task_info(
                    info,
                    self.current_run_id.unwrap_or(0),
                ));
            }
        }

        ready
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        !self.tasks.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        })
    }
}

/// A read-only view for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a BTreeMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a BTreeMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Determine whether all dependencies of the given task are satisfied for
    /// the *current run*.
    ///
    /// Dependencies in the run must have succeeded in it; dependencies
    /// outside the run count when they succeeded in an earlier run.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        for dep_name in &info.deps {
            let Some(dep) = self.tasks.get(dep_name) else {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                return false;
            };

            match dep.run_state {
                Some(RunState::DoneSuccess) => {}
                Some(RunState::DoneFailed)
                | Some(RunState::Pending)
                | Some(RunState::Running) => return false,
                None => {
                    if dep.last_successful_run.is_none() {
                        return false;
                    }
                }
            }
        }

        true
    }
}
