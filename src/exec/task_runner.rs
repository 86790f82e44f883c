// src/exec/task_runner.rs

//! Individual task runner.

use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::{ScheduledTask, TaskAction};
use crate::engine::RuntimeEvent;
use crate::pipeline::{self, FileFailure, PipelineContext, TaskReport};

/// Run a single task and emit its `TaskCompleted` event.
///
/// Every error is folded into the report, so a completion is always sent.
pub async fn run_task(
    task: ScheduledTask,
    ctx: PipelineContext,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let started = Instant::now();
    info!(task = %task.name, run_id = task.run_id, "starting task");

    let report = match &task.action {
        TaskAction::Group => TaskReport::default(),
        TaskAction::Command(cmd) => match run_command(&task, cmd, &ctx).await {
            Ok(report) => report,
            Err(err) => TaskReport::failed(ctx.root.clone(), format!("{err:#}")),
        },
        action => run_pipeline(action.clone(), ctx.clone()).await,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if report.is_success() {
        info!(
            task = %task.name,
            run_id = task.run_id,
            outputs = report.outputs.len(),
            elapsed_ms,
            "task finished"
        );
    } else {
        error!(
            task = %task.name,
            run_id = task.run_id,
            failures = report.failures.len(),
            elapsed_ms,
            "task failed"
        );
    }

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            report,
        })
        .await
        .is_err()
    {
        warn!(task = %task.name, "runtime gone; dropping completion");
    }
}

/// Adapters are CPU-bound, so they run on the blocking pool.
async fn run_pipeline(action: TaskAction, ctx: PipelineContext) -> TaskReport {
    let root = ctx.root.clone();
    match tokio::task::spawn_blocking(move || pipeline::run_action(&action, &ctx)).await {
        Ok(report) => report,
        Err(err) => TaskReport::failed(root, format!("adapter panicked: {err}")),
    }
}

async fn run_command(task: &ScheduledTask, cmd: &str, ctx: &PipelineContext) -> Result<TaskReport> {
    info!(task = %task.name, cmd = %cmd, "running shell command");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .current_dir(&ctx.root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.name))?;

    let stdout = child.stdout.take().map(|out| forward_lines(task.name.clone(), out, false));
    let stderr = child.stderr.take().map(|err| forward_lines(task.name.clone(), err, true));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", task.name))?;

    for handle in [stdout, stderr].into_iter().flatten() {
        let _ = handle.await;
    }

    if status.success() {
        Ok(TaskReport::default())
    } else {
        let code = status.code().unwrap_or(-1);
        Ok(TaskReport {
            outputs: Vec::new(),
            failures: vec![FileFailure {
                path: ctx.root.clone(),
                message: format!("command `{cmd}` exited with code {code}"),
            }],
        })
    }
}

fn forward_lines<R>(task: String, reader: R, is_stderr: bool) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!(task = %task, "{}", line);
            } else {
                info!(task = %task, "{}", line);
            }
        }
    })
}
