// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::watch::cache::FileCache;
use crate::watch::debounce::Debouncer;
use crate::watch::event_handler::{fire_trigger, match_path, relative_str, TriggerContext, WatchTrigger};
use crate::watch::hash::{HashStore, MemoryHashStore};
use crate::watch::patterns::WatchProfiles;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Settings for [`spawn_watcher`].
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Project root; all globs are evaluated relative to it.
    pub root: PathBuf,
    pub debounce: Duration,
}

/// Spawn a recursive filesystem watcher on the project root.
///
/// Changed paths are matched against `profiles`, debounced per binding and
/// then forwarded to the runtime as `TaskTriggered` or `ReloadRequested`.
pub fn spawn_watcher(
    options: WatcherOptions,
    profiles: WatchProfiles,
    graph: Arc<DagGraph>,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = options
        .root
        .canonicalize()
        .unwrap_or_else(|_| options.root.clone());

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch loop gone; dropping notify event");
                }
            }
            Err(err) => warn!("file watch error: {err}"),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "file watcher started");

    let hash_store: Box<dyn HashStore> = Box::new(MemoryHashStore::new());
    let ctx = TriggerContext {
        root: root.clone(),
        fs,
        profiles: Arc::new(profiles),
        runtime_tx,
        hash_store: Arc::new(Mutex::new(hash_store)),
        file_cache: Arc::new(Mutex::new(FileCache::new())),
    };
    let mut debouncer: Debouncer<WatchTrigger> = Debouncer::new(options.debounce);

    tokio::spawn(async move {
        loop {
            let deadline = debouncer.next_deadline();
            let sleep_until = tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now));

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if event.kind.is_access() {
                        continue;
                    }
                    record_event(&event, &ctx, &graph, &mut debouncer);
                }
                _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {}
            }

            for trigger in debouncer.take_due(Instant::now()) {
                if !fire_trigger(trigger, &ctx).await {
                    debug!("runtime closed; stopping watch loop");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn record_event(event: &Event, ctx: &TriggerContext, graph: &DagGraph, debouncer: &mut Debouncer<WatchTrigger>) {
    let now = Instant::now();
    for path in &event.paths {
        let Some(rel) = relative_str(&ctx.root, path) else {
            warn!(path = %path.display(), "event outside watch root");
            continue;
        };

        if let Ok(mut cache) = ctx.file_cache.lock() {
            cache.invalidate(path);
        }

        for trigger in match_path(&rel, &ctx.profiles, graph) {
            debouncer.record(trigger, now);
        }
    }
}
