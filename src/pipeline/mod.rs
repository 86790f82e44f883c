// src/pipeline/mod.rs

//! Asset transform adapters.
//!
//! Each task action maps to one adapter. Adapters never panic or abort the
//! process on bad input: every problem ends up as a [`FileFailure`] in the
//! task's [`TaskReport`].
//!
//! - [`scripts`]: bundles the entry file's local import graph into one
//!   bundle (plus a sourcemap in development).
//! - [`styles`]: compiles SCSS with `grass`, then prefixes and optionally
//!   minifies with `lightningcss`.
//! - [`images`]: recompresses every image under the source dir.
//! - [`svg`]: SVG minification and `<symbol>` sprite assembly.
//! - [`size`] and [`sources`] are shared helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::TaskAction;
use crate::fs::FileSystem;

pub mod images;
pub mod scripts;
pub mod size;
pub mod sources;
pub mod styles;
pub mod svg;

/// Everything an adapter needs: the project root, the immutable config and
/// the filesystem to read from and write to.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub root: PathBuf,
    pub config: Arc<ConfigFile>,
    pub fs: Arc<dyn FileSystem>,
}

impl PipelineContext {
    pub fn new(root: PathBuf, config: Arc<ConfigFile>, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, config, fs }
    }

    /// Resolve a config path against the project root.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// Path relative to the project root, with forward slashes.
    pub fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        sources::to_slash(rel)
    }

    /// Write an artifact and log its raw and gzip size.
    pub fn write_artifact(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.fs.write(path, contents)?;
        size::log_size(&self.display_path(path), contents);
        Ok(())
    }
}

/// A single input (or task) that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Result of one task execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Artifacts written, in write order.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// A report with a single failure and no outputs.
    pub fn failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            outputs: Vec::new(),
            failures: vec![FileFailure {
                path,
                message: message.into(),
            }],
        }
    }

    /// Convert a single-artifact adapter result: outputs on success, one
    /// failure naming `path` otherwise.
    pub fn from_result(path: &Path, result: Result<Vec<PathBuf>>) -> Self {
        match result {
            Ok(outputs) => Self {
                outputs,
                failures: Vec::new(),
            },
            Err(err) => Self::failed(path.to_path_buf(), format!("{err:#}")),
        }
    }
}

/// Run the adapter behind a pipeline action. Blocking; callers run it on
/// the blocking pool.
pub fn run_action(action: &TaskAction, ctx: &PipelineContext) -> TaskReport {
    debug!(?action, "running pipeline action");
    match action {
        TaskAction::Scripts(mode) => scripts::run(ctx, *mode),
        TaskAction::Styles(mode) => styles::run(ctx, *mode),
        TaskAction::CompressImages => images::run(ctx),
        TaskAction::IconSprite => svg::run(ctx),
        TaskAction::Command(_) | TaskAction::Group => TaskReport::default(),
    }
}
