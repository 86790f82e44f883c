// src/dag/scheduler.rs

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::graph::DagGraph;
use crate::dag::registry::TaskDefinition;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};
use crate::types::ReloadKind;

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - deciding when a task is ready to run (deps satisfied)
/// - marking tasks as succeeded/failed
/// - scheduling dependents when appropriate
/// - failing dependents when a task fails
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: BTreeMap<TaskName, TaskInfo>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
    /// Reload kinds of the tasks that succeeded in the active run, combined.
    run_reload: ReloadKind,
}

impl Scheduler {
    /// Construct a scheduler from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::from_definitions(&cfg.task_definitions())
    }

    /// Construct a scheduler from task definitions (assumed validated).
    pub fn from_definitions(defs: &[TaskDefinition]) -> Self {
        let graph = DagGraph::from_definitions(defs);
        let tasks = defs
            .iter()
            .map(|def| (def.name.clone(), TaskInfo::from_definition(def)))
            .collect();

        Self {
            graph,
            tasks,
            run_counter: 0,
            current_run_id: None,
            run_reload: ReloadKind::None,
        }
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Tasks of the active run that are still pending or running.
    pub fn unfinished_tasks(&self) -> Vec<TaskName> {
        self.tasks
            .values()
            .filter(|info| matches!(info.run_state, Some(RunState::Pending | RunState::Running)))
            .map(|info| info.name.clone())
            .collect()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn contains(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Names of tasks that are currently participating in the *active* run.
    pub fn tasks_in_current_run(&self) -> Vec<TaskName> {
        if self.current_run_id.is_none() {
            return Vec::new();
        }

        self.tasks
            .values()
            .filter(|info| info.run_state.is_some())
            .map(|info| info.name.clone())
            .collect()
    }

    /// Whether the dependencies of `task` are satisfied for the *current run*.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Start a new run, resetting per-run state but keeping historical success
    /// information (for dependency satisfaction on later runs).
    pub fn start_new_run(&mut self) {
        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);
        self.run_reload = ReloadKind::None;

        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        debug!(run_id = self.run_counter, "scheduler: starting new DAG run");
    }

    /// Handle a watch trigger for a task: the task plus its dependents.
    pub fn handle_trigger(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.trigger_step_internal(task).newly_scheduled
    }

    /// Handle an explicit request for a task: the task plus everything it
    /// depends on.
    pub fn handle_request(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.request_step_internal(task).newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome)
            .newly_scheduled
    }

    /// Variant of `handle_trigger` that returns a rich [`SchedulerStep`].
    pub fn step_trigger(&mut self, task: &str) -> SchedulerStep {
        self.trigger_step_internal(task)
    }

    /// Variant of `handle_request` that returns a rich [`SchedulerStep`].
    pub fn step_request(&mut self, task: &str) -> SchedulerStep {
        self.request_step_internal(task)
    }

    /// Variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Determine whether all tasks are in a terminal state and clear
    /// `current_run_id` if so.
    ///
    /// Returns `true` if this call transitioned the scheduler from running
    /// to idle.
    fn maybe_finish_run(&mut self) -> bool {
        if self.current_run_id.is_none() {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);

        if manager.all_tasks_terminal() {
            info!(
                run_id = self.current_run_id,
                "scheduler: all tasks terminal; marking run as finished"
            );
            self.current_run_id = None;
            true
        } else {
            false
        }
    }

    fn ensure_run(&mut self, task: &str) {
        if self.current_run_id.is_none() {
            debug!(
                task = %task,
                "trigger with no active run; implicitly starting a new run"
            );
            self.start_new_run();
        }
    }

    fn finish_step(&mut self, newly_scheduled: Vec<ScheduledTask>, mut newly_failed: Vec<TaskName>) -> SchedulerStep {
        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        newly_failed.extend(manager.fail_blocked_tasks());
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_failed,
            run_just_finished,
            run_reload: self.run_reload,
        }
    }

    fn trigger_step_internal(&mut self, task: &str) -> SchedulerStep {
        self.ensure_run(task);

        if self.tasks.contains_key(task) {
            let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
            manager.mark_task_and_dependents_pending(task);
        } else {
            warn!(task = %task, "trigger for unknown task; ignoring");
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        let newly_scheduled = manager.collect_new_ready_tasks();
        self.finish_step(newly_scheduled, Vec::new())
    }

    fn request_step_internal(&mut self, task: &str) -> SchedulerStep {
        self.ensure_run(task);

        if self.tasks.contains_key(task) {
            let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
            manager.mark_closure_pending(task);
        } else {
            warn!(task = %task, "request for unknown task; ignoring");
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        let newly_scheduled = manager.collect_new_ready_tasks();
        self.finish_step(newly_scheduled, Vec::new())
    }

    fn completion_step_internal(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let Some(run_id) = self.current_run_id else {
            warn!(
                task = %task,
                "handle_completion called with no active run; ignoring"
            );
            return SchedulerStep::default();
        };

        let mut newly_scheduled = Vec::new();
        let mut newly_failed = Vec::new();

        match self.tasks.get_mut(task) {
            Some(info) if info.run_state != Some(RunState::Running) => {
                warn!(
                    task = %info.name,
                    run_id,
                    "completion for a task that is not running in this run; ignoring"
                );
            }
            Some(info) => match outcome {
                TaskOutcome::Success => {
                    info.run_state = Some(RunState::DoneSuccess);
                    info.last_successful_run = Some(run_id);
                    self.run_reload = self.run_reload.max(info.reload);
                    debug!(task = %info.name, run_id, "task completed successfully");
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    newly_scheduled.extend(manager.collect_new_ready_tasks());
                }
                TaskOutcome::Failed => {
                    info.run_state = Some(RunState::DoneFailed);
                    info.last_failed_run = Some(run_id);
                    warn!(
                        task = %info.name,
                        run_id,
                        "task failed; failing dependents in this run"
                    );
                    newly_failed.push(info.name.clone());
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    newly_failed.append(&mut manager.mark_dependents_failed(task));
                }
            },
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        self.finish_step(newly_scheduled, newly_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::registry::TaskAction;

    fn def(name: &str, action: TaskAction, after: &[&str], reload: ReloadKind) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            action,
            after: after.iter().map(|s| s.to_string()).collect(),
            watch: Vec::new(),
            reload,
        }
    }

    fn cmd(name: &str, after: &[&str]) -> TaskDefinition {
        def(name, TaskAction::Command(format!("echo {name}")), after, ReloadKind::None)
    }

    fn names(tasks: &[ScheduledTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn request_runs_upstream_closure_in_parallel_then_group() {
        let mut s = Scheduler::from_definitions(&[
            cmd("scripts", &[]),
            cmd("styles", &[]),
            def("build", TaskAction::Group, &["scripts", "styles"], ReloadKind::None),
            cmd("deploy", &["build"]),
        ]);

        s.start_new_run();
        let ready = s.handle_request("build");
        assert_eq!(names(&ready), vec!["scripts", "styles"]);

        assert!(s.handle_completion("scripts", TaskOutcome::Success).is_empty());
        let ready = s.handle_completion("styles", TaskOutcome::Success);
        assert_eq!(names(&ready), vec!["build"]);

        let step = s.step_completion("build", TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert_eq!(s.run_state_of("deploy"), Some(TaskRunState::NotInRun));
    }

    #[test]
    fn failure_blocks_group_and_finishes_run() {
        let mut s = Scheduler::from_definitions(&[
            cmd("scripts", &[]),
            cmd("styles", &[]),
            def("build", TaskAction::Group, &["scripts", "styles"], ReloadKind::None),
        ]);

        s.start_new_run();
        s.handle_request("build");
        let step = s.step_completion("scripts", TaskOutcome::Failed);
        assert_eq!(step.newly_failed, vec!["scripts".to_string(), "build".to_string()]);
        assert!(!step.run_just_finished);

        let step = s.step_completion("styles", TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert!(s.is_idle());
    }

    #[test]
    fn trigger_skips_groups_and_stranded_dependents() {
        let mut s = Scheduler::from_definitions(&[
            cmd("dev-scripts", &[]),
            cmd("dev-styles", &[]),
            def("default", TaskAction::Group, &["dev-scripts", "dev-styles"], ReloadKind::None),
            cmd("lint", &["dev-styles"]),
            cmd("report", &["lint", "dev-scripts"]),
        ]);

        s.start_new_run();
        let ready = s.handle_trigger("dev-styles");
        assert_eq!(names(&ready), vec!["dev-styles"]);
        assert_eq!(s.run_state_of("default"), Some(TaskRunState::NotInRun));
        assert_eq!(s.run_state_of("lint"), Some(TaskRunState::Pending));
        // dev-scripts never ran, so report could never become ready.
        assert_eq!(s.run_state_of("report"), Some(TaskRunState::NotInRun));

        let ready = s.handle_completion("dev-styles", TaskOutcome::Success);
        assert_eq!(names(&ready), vec!["lint"]);
        let step = s.step_completion("lint", TaskOutcome::Success);
        assert!(step.run_just_finished);
    }

    #[test]
    fn run_reload_is_the_strongest_successful_kind() {
        let mut s = Scheduler::from_definitions(&[
            def("styles", TaskAction::Command("x".into()), &[], ReloadKind::InjectCss),
            def("scripts", TaskAction::Command("y".into()), &[], ReloadKind::Full),
        ]);

        s.start_new_run();
        s.handle_trigger("styles");
        let step = s.step_completion("styles", TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert_eq!(step.run_reload, ReloadKind::InjectCss);

        s.start_new_run();
        s.handle_trigger("styles");
        s.handle_trigger("scripts");
        s.handle_completion("styles", TaskOutcome::Success);
        let step = s.step_completion("scripts", TaskOutcome::Failed);
        assert_eq!(step.run_reload, ReloadKind::InjectCss);

        s.start_new_run();
        s.handle_trigger("styles");
        s.handle_trigger("scripts");
        s.handle_completion("styles", TaskOutcome::Success);
        let step = s.step_completion("scripts", TaskOutcome::Success);
        assert_eq!(step.run_reload, ReloadKind::Full);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut s = Scheduler::from_definitions(&[cmd("a", &[]), cmd("b", &[])]);
        s.start_new_run();
        s.handle_trigger("a");
        s.handle_completion("a", TaskOutcome::Success);
        assert!(s.is_idle());

        s.start_new_run();
        s.handle_trigger("b");
        let step = s.step_completion("a", TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert!(!step.run_just_finished);
    }
}
