// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from channels,
//! sends `ScheduledTask`s to the executor and broadcasts reloads. The core
//! is unit tested without any Tokio, channels, filesystem, or processes.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_reload_request, handle_shutdown, handle_task_completion, handle_task_trigger, CoreState,
    CoreStep,
};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RunSummary, RuntimeEvent, RuntimeOptions};
use crate::types::TriggerWhileRunningBehaviour;

/// Pure core runtime state.
///
/// Owns the DAG scheduler, the trigger queue, the runtime options and the
/// session's [`RunSummary`]. It has no channels and performs no IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    options: RuntimeOptions,
    summary: RunSummary,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        queue_length: usize,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            queue: TriggerQueue::new(behaviour, queue_length),
            options,
            summary: RunSummary::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Failures recorded so far.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let state = CoreState {
            scheduler: &mut self.scheduler,
            queue: &mut self.queue,
            options: &self.options,
            summary: &mut self.summary,
        };

        match event {
            RuntimeEvent::TaskTriggered { task, reason } => handle_task_trigger(state, task, reason),
            RuntimeEvent::TaskCompleted { task, report } => {
                handle_task_completion(state, task, report)
            }
            RuntimeEvent::ReloadRequested { kind } => handle_reload_request(state, kind),
            RuntimeEvent::ShutdownRequested => handle_shutdown(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::dag::registry::{TaskAction, TaskDefinition};
    use crate::engine::{CoreCommand, TriggerReason};
    use crate::pipeline::{FileFailure, TaskReport};
    use crate::types::{BuildMode, ReloadKind};

    fn defs() -> Vec<TaskDefinition> {
        let task = |name: &str, action: TaskAction, after: &[&str], reload: ReloadKind| {
            TaskDefinition {
                name: name.to_string(),
                action,
                after: after.iter().map(|s| s.to_string()).collect(),
                watch: Vec::new(),
                reload,
            }
        };
        vec![
            task("run-dev-scripts", TaskAction::Scripts(BuildMode::Development), &[], ReloadKind::Full),
            task("run-dev-styles", TaskAction::Styles(BuildMode::Development), &[], ReloadKind::InjectCss),
            task("default", TaskAction::Group, &["run-dev-scripts", "run-dev-styles"], ReloadKind::None),
        ]
    }

    fn core(options: RuntimeOptions) -> CoreRuntime {
        CoreRuntime::new(
            Scheduler::from_definitions(&defs()),
            TriggerWhileRunningBehaviour::Queue,
            1,
            options,
        )
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.name.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn completed(task: &str, report: TaskReport) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            task: task.to_string(),
            report,
        }
    }

    #[test]
    fn one_shot_request_exits_when_idle() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: true,
            notify_reload: false,
        });

        let step = core.step(RuntimeEvent::TaskTriggered {
            task: "default".into(),
            reason: TriggerReason::Requested,
        });
        assert_eq!(dispatched(&step), vec!["run-dev-scripts", "run-dev-styles"]);
        assert!(step.keep_running);

        core.step(completed("run-dev-scripts", TaskReport::default()));
        let step = core.step(completed("run-dev-styles", TaskReport::default()));
        assert_eq!(dispatched(&step), vec!["default"]);

        let step = core.step(completed("default", TaskReport::default()));
        assert!(!step.keep_running);
        assert!(step.commands.contains(&CoreCommand::RequestExit));
        assert!(core.summary().is_success());
    }

    #[test]
    fn failures_are_recorded_in_summary() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: true,
            notify_reload: false,
        });
        core.step(RuntimeEvent::TaskTriggered {
            task: "default".into(),
            reason: TriggerReason::Requested,
        });

        let failed = TaskReport {
            outputs: Vec::new(),
            failures: vec![FileFailure {
                path: PathBuf::from("assets/src/js/main.js"),
                message: "unexpected token".into(),
            }],
        };
        core.step(completed("run-dev-scripts", failed));
        let step = core.step(completed("run-dev-styles", TaskReport::default()));
        assert!(!step.keep_running);

        let failed: Vec<_> = core.summary().failed_tasks.iter().cloned().collect();
        assert_eq!(failed, vec!["default".to_string(), "run-dev-scripts".to_string()]);
    }

    #[test]
    fn watch_trigger_during_run_is_queued_and_reload_follows() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: false,
            notify_reload: true,
        });

        let step = core.step(RuntimeEvent::TaskTriggered {
            task: "run-dev-styles".into(),
            reason: TriggerReason::FileWatch,
        });
        assert_eq!(dispatched(&step), vec!["run-dev-styles"]);

        // Re-trigger while running: nothing dispatched yet.
        for _ in 0..3 {
            let step = core.step(RuntimeEvent::TaskTriggered {
                task: "run-dev-styles".into(),
                reason: TriggerReason::FileWatch,
            });
            assert!(step.commands.is_empty());
        }
        assert!(!core.queue_is_empty());

        let step = core.step(completed("run-dev-styles", TaskReport::default()));
        assert!(step.commands.contains(&CoreCommand::Reload(ReloadKind::InjectCss)));
        // Exactly one follow-up run.
        assert_eq!(dispatched(&step), vec!["run-dev-styles"]);
        assert!(core.queue_is_empty());
    }

    #[test]
    fn reload_request_passes_through_in_watch_mode() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: false,
            notify_reload: true,
        });
        let step = core.step(RuntimeEvent::ReloadRequested {
            kind: ReloadKind::Full,
        });
        assert_eq!(step.commands, vec![CoreCommand::Reload(ReloadKind::Full)]);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let mut core = core(RuntimeOptions::default());
        assert!(!core.step(RuntimeEvent::ShutdownRequested).keep_running);
        assert!(core.summary().is_success());
    }

    #[test]
    fn shutdown_during_one_shot_build_marks_unfinished_tasks() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: true,
            notify_reload: false,
        });
        core.step(RuntimeEvent::TaskTriggered {
            task: "default".into(),
            reason: TriggerReason::Requested,
        });
        core.step(completed("run-dev-scripts", TaskReport::default()));

        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);

        let summary = core.into_summary();
        assert!(!summary.is_success());
        assert!(summary.failed_tasks.is_empty());
        let interrupted: Vec<&str> = summary.interrupted_tasks.iter().map(String::as_str).collect();
        assert_eq!(interrupted, vec!["default", "run-dev-styles"]);
    }

    #[test]
    fn failure_in_watch_mode_keeps_the_session_running() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: false,
            notify_reload: true,
        });
        let watch = || RuntimeEvent::TaskTriggered {
            task: "run-dev-styles".into(),
            reason: TriggerReason::FileWatch,
        };

        assert_eq!(dispatched(&core.step(watch())), vec!["run-dev-styles"]);
        let step = core.step(completed(
            "run-dev-styles",
            TaskReport::failed(PathBuf::from("assets/src/scss/style.scss"), "undefined variable"),
        ));
        assert!(step.keep_running);
        assert!(!step.commands.contains(&CoreCommand::RequestExit));
        assert!(core.summary().failed_tasks.contains("run-dev-styles"));

        // The next save runs the task again.
        let step = core.step(watch());
        assert!(step.keep_running);
        assert_eq!(dispatched(&step), vec!["run-dev-styles"]);
    }
}
