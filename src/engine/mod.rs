// src/engine/mod.rs

//! Orchestration engine for assetdag.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the trigger queue (what happens when triggers arrive while a run is active)
//! - the main runtime event loop that reacts to task requests, file-watch
//!   triggers, task completions, reload requests and shutdown signals.
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::collections::BTreeSet;

use crate::pipeline::TaskReport;
use crate::types::ReloadKind;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

/// Why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerReason {
    /// Asked for by name (CLI argument, initial watch-mode build).
    /// The task's whole upstream closure runs.
    Requested,
    /// Triggered due to a filesystem event. The task and its dependents run.
    FileWatch,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit the runtime once the DAG is idle and there are no queued
    /// triggers (one-shot builds).
    pub exit_when_idle: bool,
    /// Emit reload commands when a run finishes (watch mode).
    pub notify_reload: bool,
}

/// Events flowing into the runtime from the CLI, watchers and executors.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task should be (logically) triggered.
    TaskTriggered {
        task: TaskName,
        reason: TriggerReason,
    },
    /// A task finished; its report decides success or failure.
    TaskCompleted { task: TaskName, report: TaskReport },
    /// A reload-only watch binding fired.
    ReloadRequested { kind: ReloadKind },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Failed tasks over a whole runtime session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub failed_tasks: BTreeSet<TaskName>,
    /// Tasks still pending or running when a one-shot build was shut down.
    pub interrupted_tasks: BTreeSet<TaskName>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed_tasks.is_empty() && self.interrupted_tasks.is_empty()
    }
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::TriggerQueue;
pub use crate::types::TriggerWhileRunningBehaviour;
pub use runtime::Runtime;
