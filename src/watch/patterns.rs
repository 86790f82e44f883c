// src/watch/patterns.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::ConfigFile;
use crate::engine::TaskName;
use crate::fs::FileSystem;
use crate::pipeline::sources::{expand_glob, to_slash};

/// Compiled include/exclude glob pair. Paths are root-relative with forward
/// slashes, e.g. `"assets/src/js/main.js"`.
#[derive(Clone)]
pub struct GlobFilter {
    patterns: Vec<String>,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl GlobFilter {
    pub fn new(watch: &[String], exclude: &[String]) -> Result<Self> {
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude)?)
        };
        Ok(Self {
            patterns: watch.to_vec(),
            watch_set: build_globset(watch)?,
            exclude_set,
        })
    }

    /// The include patterns this filter was built from.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.watch_set.is_match(rel_path)
            && !self
                .exclude_set
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(rel_path))
    }
}

/// Watch binding of a single task.
#[derive(Clone)]
pub struct TaskWatchProfile {
    name: TaskName,
    filter: GlobFilter,
    use_hash: bool,
}

impl fmt::Debug for TaskWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatchProfile")
            .field("name", &self.name)
            .field("use_hash", &self.use_hash)
            .finish_non_exhaustive()
    }
}

impl TaskWatchProfile {
    pub fn new(name: impl Into<TaskName>, filter: GlobFilter, use_hash: bool) -> Self {
        Self {
            name: name.into(),
            filter,
            use_hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only trigger when the aggregated watched content changed.
    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.filter.matches(rel_path)
    }
}

/// Every compiled binding the watcher needs.
#[derive(Clone, Default)]
pub struct WatchProfiles {
    pub tasks: Vec<TaskWatchProfile>,
    /// Files that only reload the browser (`dev_server.watched_files`).
    pub reload: Option<GlobFilter>,
}

impl fmt::Debug for WatchProfiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchProfiles")
            .field("tasks", &self.tasks)
            .field("reload", &self.reload.is_some())
            .finish()
    }
}

/// Build the watch bindings from a validated config.
///
/// Task bindings use each task's `watch` globs minus `[watch].exclude`.
/// Everything below a task output directory is excluded from all bindings.
pub fn build_profiles_from_config(cfg: &ConfigFile) -> Result<WatchProfiles> {
    let mut exclude = cfg.watch_section().exclude.clone();
    exclude.extend(
        cfg.output_dirs()
            .iter()
            .map(|dir| format!("{}/**", dir.trim_end_matches('/'))),
    );

    let use_hash = cfg.watch_section().use_hash;
    let mut tasks = Vec::new();
    for def in cfg.task_definitions() {
        if def.watch.is_empty() {
            continue;
        }
        let filter = GlobFilter::new(&def.watch, &exclude)
            .with_context(|| format!("building watch globset for task {}", def.name))?;
        tasks.push(TaskWatchProfile::new(def.name, filter, use_hash));
    }

    let watched = &cfg.dev_server().watched_files;
    let reload = if watched.is_empty() {
        None
    } else {
        Some(GlobFilter::new(watched, &exclude).context("building dev_server.watched_files globset")?)
    };

    Ok(WatchProfiles { tasks, reload })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?);
    }
    Ok(builder.build()?)
}

/// All files under `root` the profile watches, sorted. Used for content
/// hashing.
///
/// Only the literal directory prefix of each pattern is walked.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    profile: &TaskWatchProfile,
) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for pattern in profile.filter.patterns() {
        for path in expand_glob(fs, root, pattern)? {
            let included = path
                .strip_prefix(root)
                .is_ok_and(|rel| profile.matches(&to_slash(rel)));
            if included {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}
