// src/exec/executor_loop.rs

//! Main executor loop that manages running tasks.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::pipeline::PipelineContext;

/// Spawn the background executor loop.
///
/// Each scheduled task runs in its own Tokio task. Per task name there is
/// never more than one instance running: a new instance waits for the
/// previous one to finish before it starts, so two runs never write the
/// same output concurrently.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    ctx: PipelineContext,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();

        while let Some(task) = rx.recv().await {
            handle_scheduled_task(task, &mut active, &runtime_tx, &ctx);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<String, JoinHandle<()>>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    ctx: &PipelineContext,
) {
    let name = task.name.clone();
    let previous = active.remove(&name).filter(|handle| !handle.is_finished());

    if previous.is_some() {
        debug!(
            task = %name,
            run_id = task.run_id,
            "previous instance still running; new instance will wait for it"
        );
    }

    let rt_tx = runtime_tx.clone();
    let ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        run_task(task, ctx, rt_tx).await;
    });

    active.insert(name, handle);
}
