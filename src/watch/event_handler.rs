// src/watch/event_handler.rs

//! Turning changed paths into task triggers and reload requests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::engine::{RuntimeEvent, TaskName, TriggerReason};
use crate::fs::FileSystem;
use crate::pipeline::sources::to_slash;
use crate::types::ReloadKind;
use crate::watch::cache::FileCache;
use crate::watch::hash::{compute_aggregate_hash, HashStore};
use crate::watch::patterns::{collect_matching_files, TaskWatchProfile, WatchProfiles};

/// What a debounced binding does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WatchTrigger {
    Task(TaskName),
    Reload(ReloadKind),
}

/// `path` relative to `root`, with forward slashes.
///
/// Falls back to canonicalized paths, since some platforms report events
/// under a different absolute prefix (symlinked temp dirs on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    let (root_canon, path_canon) = (root.canonicalize().ok()?, path.canonicalize().ok()?);
    path_canon.strip_prefix(&root_canon).ok().map(to_slash)
}

/// Bindings that fire for one changed path.
///
/// Only the top-most matching tasks are returned: when a matching task has a
/// matching ancestor, the ancestor's run already covers it.
pub fn match_path(rel_path: &str, profiles: &WatchProfiles, graph: &DagGraph) -> Vec<WatchTrigger> {
    let matching: BTreeSet<&str> = profiles
        .tasks
        .iter()
        .filter(|p| p.matches(rel_path))
        .map(TaskWatchProfile::name)
        .collect();

    let mut triggers: Vec<WatchTrigger> = matching
        .iter()
        .filter(|name| {
            let name: &str = name;
            !graph
                .upstream_closure(name)
                .iter()
                .any(|ancestor| ancestor.as_str() != name && matching.contains(ancestor.as_str()))
        })
        .map(|name| WatchTrigger::Task(name.to_string()))
        .collect();

    if profiles.reload.as_ref().is_some_and(|r| r.matches(rel_path)) {
        triggers.push(WatchTrigger::Reload(ReloadKind::for_path(rel_path)));
    }

    if !triggers.is_empty() {
        debug!(rel = %rel_path, ?triggers, "path matched watch bindings");
    }
    triggers
}

/// Shared state for firing debounced triggers.
#[derive(Clone)]
pub struct TriggerContext {
    pub root: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    pub profiles: Arc<WatchProfiles>,
    pub runtime_tx: mpsc::Sender<RuntimeEvent>,
    pub hash_store: Arc<Mutex<Box<dyn HashStore>>>,
    pub file_cache: Arc<Mutex<FileCache>>,
}

/// Emit the runtime event for a debounced trigger.
///
/// Returns `false` once the runtime channel is closed.
pub async fn fire_trigger(trigger: WatchTrigger, ctx: &TriggerContext) -> bool {
    let event = match trigger {
        WatchTrigger::Task(task) => {
            let profile = ctx.profiles.tasks.iter().find(|p| p.name() == task);
            if let Some(profile) = profile.filter(|p| p.use_hash()) {
                if !content_changed(profile.clone(), ctx.clone()).await {
                    info!(task = %task, "watched content unchanged; skipping trigger");
                    return true;
                }
            }
            debug!(task = %task, "watch match -> triggering task");
            RuntimeEvent::TaskTriggered {
                task,
                reason: TriggerReason::FileWatch,
            }
        }
        WatchTrigger::Reload(kind) => {
            debug!(?kind, "reload-only binding fired");
            RuntimeEvent::ReloadRequested { kind }
        }
    };

    if let Err(err) = ctx.runtime_tx.send(event).await {
        warn!("failed to send watch event to runtime: {err}");
        return false;
    }
    true
}

/// Compare the aggregated content hash of everything `profile` watches
/// against the last one seen. Any error counts as changed.
async fn content_changed(profile: TaskWatchProfile, ctx: TriggerContext) -> bool {
    tokio::task::spawn_blocking(move || {
        let task = profile.name();
        let files = match collect_matching_files(ctx.fs.as_ref(), &ctx.root, &profile) {
            Ok(files) => files,
            Err(err) => {
                warn!(task = %task, error = %err, "failed to collect watched files; triggering anyway");
                return true;
            }
        };

        let mut hashes = Vec::with_capacity(files.len());
        {
            let Ok(mut cache) = ctx.file_cache.lock() else {
                warn!("file cache mutex poisoned; triggering anyway");
                return true;
            };
            for file in &files {
                match cache.get_or_compute(ctx.fs.as_ref(), file) {
                    Ok(hash) => hashes.push(hash),
                    Err(err) => {
                        warn!(task = %task, file = %file.display(), error = %err, "failed to hash file; triggering anyway");
                        return true;
                    }
                }
            }
        }

        let new_hash = compute_aggregate_hash(
            files
                .iter()
                .map(PathBuf::as_path)
                .zip(hashes.iter().map(String::as_str)),
        );

        let Ok(mut store) = ctx.hash_store.lock() else {
            warn!(task = %task, "hash store mutex poisoned; triggering anyway");
            return true;
        };
        if store.load(task).as_deref() == Some(new_hash.as_str()) {
            return false;
        }
        store.save(task, &new_hash);
        true
    })
    .await
    .unwrap_or(true)
}
