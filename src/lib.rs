// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod watch;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, DEFAULT_TASK};
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::Scheduler;
use crate::engine::{CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason};
use crate::errors::{AssetdagError, Error, Result};
use crate::exec::RealExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::PipelineContext;
use crate::server::ReloadHub;
use crate::watch::{build_profiles_from_config, spawn_watcher, WatcherOptions};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, then either prints the graph (`--dry-run`), runs watch
/// mode, or runs a single task once.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = Arc::new(load_config(&config_path)?);
    let root = config_root_dir(&config_path);

    if args.dry_run {
        print_dry_run(&cfg, &args.task)?;
        return Ok(());
    }

    if args.is_watch() {
        return run_watch(cfg, root).await;
    }

    let summary = run_once(cfg, root, &args.task).await?;
    if summary.is_success() {
        info!(task = %args.task, "build finished");
        return Ok(());
    }

    let list = |tasks: &BTreeSet<String>| {
        tasks.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    };
    let mut problems = Vec::new();
    if !summary.failed_tasks.is_empty() {
        problems.push(format!("failed tasks: {}", list(&summary.failed_tasks)));
    }
    if !summary.interrupted_tasks.is_empty() {
        problems.push(format!("interrupted tasks: {}", list(&summary.interrupted_tasks)));
    }
    Err(AssetdagError::BuildFailed(problems.join("; ")))
}

/// Run `task` and its upstream closure once, then return the failures.
pub async fn run_once(cfg: Arc<ConfigFile>, root: PathBuf, task: &str) -> Result<RunSummary> {
    let scheduler = Scheduler::from_config(&cfg);
    if !scheduler.contains(task) {
        return Err(AssetdagError::TaskNotFound(task.to_string()));
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let executor = RealExecutorBackend::new(rt_tx.clone(), PipelineContext::new(root, cfg.clone(), fs));
    spawn_shutdown_on_ctrl_c(rt_tx.clone());

    rt_tx
        .send(RuntimeEvent::TaskTriggered {
            task: task.to_string(),
            reason: TriggerReason::Requested,
        })
        .await
        .map_err(Error::from)?;

    let options = RuntimeOptions {
        exit_when_idle: true,
        notify_reload: false,
    };
    let section = cfg.config_section();
    let core = CoreRuntime::new(
        scheduler,
        section.triggered_while_running_behaviour,
        section.queue_length,
        options,
    );
    Runtime::new(core, rt_rx, executor).run().await
}

/// Watch mode: dev server, file watcher and an initial `default` build.
///
/// Runs until Ctrl-C. Task failures are logged, never fatal.
pub async fn run_watch(cfg: Arc<ConfigFile>, root: PathBuf) -> Result<()> {
    // Fail on a bad dev-server config before building or binding anything.
    cfg.dev_server().mode()?;

    let hub = ReloadHub::new();
    let server = server::start(cfg.dev_server(), &root, hub.clone()).await?;

    let scheduler = Scheduler::from_config(&cfg);
    let graph = Arc::new(scheduler.graph().clone());
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(
        rt_tx.clone(),
        PipelineContext::new(root.clone(), cfg.clone(), fs.clone()),
    );

    let profiles = build_profiles_from_config(&cfg)?;
    let _watcher = spawn_watcher(
        WatcherOptions {
            root,
            debounce: Duration::from_millis(cfg.watch_section().debounce_ms),
        },
        profiles,
        graph,
        fs,
        rt_tx.clone(),
    )?;
    spawn_shutdown_on_ctrl_c(rt_tx.clone());

    rt_tx
        .send(RuntimeEvent::TaskTriggered {
            task: DEFAULT_TASK.to_string(),
            reason: TriggerReason::Requested,
        })
        .await
        .map_err(Error::from)?;

    info!(addr = %server.local_addr(), "watching for changes; press Ctrl-C to stop");

    let options = RuntimeOptions {
        exit_when_idle: false,
        notify_reload: true,
    };
    let section = cfg.config_section();
    let core = CoreRuntime::new(
        scheduler,
        section.triggered_while_running_behaviour,
        section.queue_length,
        options,
    );
    let summary = Runtime::new(core, rt_rx, executor).with_reload(hub).run().await?;

    if !summary.is_success() {
        warn!(failed = ?summary.failed_tasks, "some tasks failed during the watch session");
    }
    Ok(())
}

/// Load and validate the config. A missing default `Assetdag.toml` means
/// "all defaults"; an explicitly named file must exist.
fn load_config(config_path: &Path) -> Result<ConfigFile> {
    if !config_path.exists() && config_path == default_config_path() {
        info!(path = %config_path.display(), "no config file found; using defaults");
        return ConfigFile::try_from(RawConfigFile::default());
    }
    load_and_validate(config_path)
}

fn spawn_shutdown_on_ctrl_c(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Ctrl-C received; shutting down");
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

/// Project root: the directory containing the config file.
///
/// A bare filename like "Assetdag.toml" (parent = "") means the current
/// working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print the task graph in topological order and what `task` would run.
fn print_dry_run(cfg: &ConfigFile, task: &str) -> Result<()> {
    let defs = cfg.task_definitions();
    let scheduler = Scheduler::from_definitions(&defs);
    let graph = scheduler.graph();

    println!("assetdag dry-run");
    println!(
        "  config.triggered_while_running_behaviour = {:?}",
        cfg.config_section().triggered_while_running_behaviour
    );
    println!("  config.queue_length = {}", cfg.config_section().queue_length);
    println!();

    println!("tasks ({}), in execution order:", defs.len());
    for name in graph.topological_order() {
        let Some(def) = defs.iter().find(|d| d.name == name) else {
            continue;
        };
        println!("  - {name}: {}", def.action);
        if !def.after.is_empty() {
            println!("      after: {}", def.after.join(", "));
        }
        if !def.watch.is_empty() {
            println!("      watch: {}", def.watch.join(", "));
        }
    }

    if task != cli::WATCH_TASK {
        if !graph.contains(task) {
            return Err(AssetdagError::TaskNotFound(task.to_string()));
        }
        let closure = graph.upstream_closure(task);
        let order: Vec<String> = graph
            .topological_order()
            .into_iter()
            .filter(|name| closure.contains(name))
            .collect();
        println!();
        println!("`{task}` runs: {}", order.join(" -> "));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
