// src/exec/mod.rs

//! Task execution layer.
//!
//! Runs scheduled tasks and reports back to the orchestration runtime via
//! `RuntimeEvent::TaskCompleted`.
//!
//! - [`executor_loop`] owns the background loop that spawns task runners and
//!   keeps at most one instance of each task name in flight.
//! - [`task_runner`] runs a single task: a pipeline adapter on the blocking
//!   pool, a shell command, or nothing at all for group tasks.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
