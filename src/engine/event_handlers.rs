// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskRunState};
use crate::engine::queue::{QueuedTrigger, TriggerQueue};
use crate::engine::{RunSummary, RuntimeOptions, TaskName, TaskOutcome, TriggerReason};
use crate::pipeline::TaskReport;
use crate::types::ReloadKind;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Tell connected browsers to reload.
    Reload(ReloadKind),
    /// Request that the process exits (one-shot builds once idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Mutable state the handlers operate on.
#[derive(Debug)]
pub struct CoreState<'a> {
    pub scheduler: &'a mut Scheduler,
    pub queue: &'a mut TriggerQueue,
    pub options: &'a RuntimeOptions,
    pub summary: &'a mut RunSummary,
}

/// Handle a task trigger or request.
///
/// - If the scheduler is idle, a new run starts, seeded with this trigger
///   plus anything that was already queued.
/// - If a run is active and the task already takes part in it, the trigger
///   is queued for a *future* run (single-flight).
/// - If the task is not in the current run, it is merged into the run
///   immediately so unrelated branches share the run and run in parallel.
pub fn handle_task_trigger(
    mut state: CoreState<'_>,
    task: TaskName,
    reason: TriggerReason,
) -> CoreStep {
    let mut commands = Vec::new();

    if !state.scheduler.contains(&task) {
        warn!(task = %task, "trigger for unknown task; ignoring");
        return finish(state, commands);
    }

    if state.scheduler.is_idle() {
        let mut triggers = state.queue.drain_pending();
        triggers.push((task, reason));
        let step = start_new_run_from_triggers(state.scheduler, triggers);
        absorb_step(&mut state, step, &mut commands);
        return finish(state, commands);
    }

    match state.scheduler.run_state_of(&task) {
        Some(TaskRunState::NotInRun) => {
            let step = apply_trigger(state.scheduler, &task, reason);
            absorb_step(&mut state, step, &mut commands);
        }
        Some(_) => {
            debug!(task = %task, ?reason, "task already in current run; queueing trigger");
            state.queue.record_trigger(&task, reason);
        }
        None => {}
    }

    finish(state, commands)
}

/// Handle a task completion event.
pub fn handle_task_completion(mut state: CoreState<'_>, task: TaskName, report: TaskReport) -> CoreStep {
    let mut commands = Vec::new();

    let outcome = if report.is_success() {
        TaskOutcome::Success
    } else {
        for failure in &report.failures {
            warn!(
                task = %task,
                file = %failure.path.display(),
                error = %failure.message,
                "task reported a failure"
            );
        }
        TaskOutcome::Failed
    };

    let step = state.scheduler.step_completion(&task, outcome);
    absorb_step(&mut state, step, &mut commands);

    finish(state, commands)
}

/// Handle a reload-only watch binding.
pub fn handle_reload_request(state: CoreState<'_>, kind: ReloadKind) -> CoreStep {
    let mut commands = Vec::new();
    if state.options.notify_reload && kind != ReloadKind::None {
        commands.push(CoreCommand::Reload(kind));
    }
    CoreStep {
        commands,
        keep_running: true,
    }
}

/// Handle a shutdown request. A one-shot build that has not finished
/// records its unfinished tasks as interrupted.
pub fn handle_shutdown(state: CoreState<'_>) -> CoreStep {
    if state.options.exit_when_idle && !state.scheduler.is_idle() {
        let unfinished = state.scheduler.unfinished_tasks();
        warn!(tasks = ?unfinished, "shutdown requested before the build finished");
        state.summary.interrupted_tasks.extend(unfinished);
    }
    CoreStep {
        commands: Vec::new(),
        keep_running: false,
    }
}

/// Seed a fresh run from a batch of triggers.
pub fn start_new_run_from_triggers(
    scheduler: &mut Scheduler,
    triggers: Vec<QueuedTrigger>,
) -> SchedulerStep {
    let mut combined = SchedulerStep::default();
    if triggers.is_empty() {
        return combined;
    }

    scheduler.start_new_run();
    for (task, reason) in triggers {
        let step = apply_trigger(scheduler, &task, reason);
        combined.newly_scheduled.extend(step.newly_scheduled);
        combined.newly_failed.extend(step.newly_failed);
        combined.run_just_finished |= step.run_just_finished;
        combined.run_reload = combined.run_reload.max(step.run_reload);
    }
    combined
}

fn apply_trigger(scheduler: &mut Scheduler, task: &str, reason: TriggerReason) -> SchedulerStep {
    match reason {
        TriggerReason::Requested => scheduler.step_request(task),
        TriggerReason::FileWatch => scheduler.step_trigger(task),
    }
}

/// Turn a scheduler step into commands and record failures.
fn absorb_step(state: &mut CoreState<'_>, step: SchedulerStep, commands: &mut Vec<CoreCommand>) {
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    state.summary.failed_tasks.extend(step.newly_failed);
    if step.run_just_finished {
        info!(reload = ?step.run_reload, "DAG run finished");
        if state.options.notify_reload && step.run_reload != ReloadKind::None {
            commands.push(CoreCommand::Reload(step.run_reload));
        }
    }
}

/// Start queued runs while idle, then decide whether to keep running.
fn finish(mut state: CoreState<'_>, mut commands: Vec<CoreCommand>) -> CoreStep {
    while state.scheduler.is_idle() && !state.queue.is_empty() {
        let triggers = state.queue.drain_pending();
        let step = start_new_run_from_triggers(state.scheduler, triggers);
        absorb_step(&mut state, step, &mut commands);
    }

    let mut keep_running = true;
    if state.options.exit_when_idle && state.scheduler.is_idle() && state.queue.is_empty() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
