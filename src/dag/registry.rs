// src/dag/registry.rs

//! The static set of task definitions.
//!
//! Built-in tasks cover the asset categories; `[task.<name>]` entries add
//! shell commands on top. Ordering between tasks is expressed only through
//! `after` edges, never through declaration order.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::model::{MediaConfig, ScriptsConfig, StylesConfig, TaskConfig};
use crate::engine::TaskName;
use crate::types::{BuildMode, ReloadKind};

pub const RUN_DEV_SCRIPTS: &str = "run-dev-scripts";
pub const RUN_DEV_STYLES: &str = "run-dev-styles";
pub const BUILD_SCRIPTS: &str = "build-scripts";
pub const BUILD_STYLES: &str = "build-styles";
pub const COMPRESS_IMAGES: &str = "compress-images";
pub const BUILD_ICON_SPRITE: &str = "build-icon-sprite";
pub const BUILD: &str = "build";
pub const DEFAULT: &str = "default";

/// Names reserved by the built-in registry (`watch` is a mode, not a task).
pub const BUILTIN_TASKS: &[&str] = &[
    RUN_DEV_SCRIPTS,
    RUN_DEV_STYLES,
    BUILD_SCRIPTS,
    BUILD_STYLES,
    COMPRESS_IMAGES,
    BUILD_ICON_SPRITE,
    BUILD,
    DEFAULT,
    crate::cli::WATCH_TASK,
];

/// Extensions picked up by `compress-images`.
pub const IMAGE_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "svg", "ico"];

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Bundle the script entry and its local imports.
    Scripts(BuildMode),
    /// Compile and prefix the main stylesheet.
    Styles(BuildMode),
    /// Compress every image below the image source dir.
    CompressImages,
    /// Minify icons and merge them into one `<symbol>` sprite.
    IconSprite,
    /// Run a shell command.
    Command(String),
    /// No work of its own; completes once its predecessors did.
    Group,
}

impl TaskAction {
    pub fn is_group(&self) -> bool {
        matches!(self, TaskAction::Group)
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Scripts(mode) => write!(f, "bundle scripts ({mode})"),
            TaskAction::Styles(mode) => write!(f, "compile styles ({mode})"),
            TaskAction::CompressImages => f.write_str("compress images"),
            TaskAction::IconSprite => f.write_str("build icon sprite"),
            TaskAction::Command(cmd) => write!(f, "sh: {cmd}"),
            TaskAction::Group => f.write_str("group"),
        }
    }
}

/// A named node of the build graph.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub name: TaskName,
    pub action: TaskAction,
    /// Predecessors that must succeed first.
    pub after: Vec<TaskName>,
    /// Globs (relative to the project root) that retrigger this task in
    /// watch mode. Empty means "not watched".
    pub watch: Vec<String>,
    /// What browsers should do after this task succeeds in watch mode.
    pub reload: ReloadKind,
}

impl TaskDefinition {
    fn builtin(name: &str, action: TaskAction, watch: Vec<String>, reload: ReloadKind) -> Self {
        Self {
            name: name.to_string(),
            action,
            after: Vec::new(),
            watch,
            reload,
        }
    }

    fn group(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            action: TaskAction::Group,
            after: members.iter().map(|s| s.to_string()).collect(),
            watch: Vec::new(),
            reload: ReloadKind::None,
        }
    }
}

/// Build the full list of task definitions, built-ins first.
pub fn build_definitions(
    scripts: &ScriptsConfig,
    styles: &StylesConfig,
    media: &MediaConfig,
    custom: &BTreeMap<String, TaskConfig>,
) -> Vec<TaskDefinition> {
    let image_glob = format!(
        "{}/**/*.{{{}}}",
        media.image_source_dir.trim_end_matches('/'),
        IMAGE_EXTENSIONS.join(",")
    );
    let icon_glob = format!("{}/*.svg", media.icon_source_dir.trim_end_matches('/'));

    let mut defs = vec![
        TaskDefinition::builtin(
            RUN_DEV_SCRIPTS,
            TaskAction::Scripts(BuildMode::Development),
            vec![scripts.source_glob.clone(), scripts.entry_file.clone()],
            ReloadKind::Full,
        ),
        TaskDefinition::builtin(
            RUN_DEV_STYLES,
            TaskAction::Styles(BuildMode::Development),
            vec![styles.source_glob.clone(), styles.main_file.clone()],
            ReloadKind::InjectCss,
        ),
        TaskDefinition::builtin(
            BUILD_SCRIPTS,
            TaskAction::Scripts(BuildMode::Production),
            Vec::new(),
            ReloadKind::Full,
        ),
        TaskDefinition::builtin(
            BUILD_STYLES,
            TaskAction::Styles(BuildMode::Production),
            Vec::new(),
            ReloadKind::InjectCss,
        ),
        TaskDefinition::builtin(
            COMPRESS_IMAGES,
            TaskAction::CompressImages,
            vec![image_glob],
            ReloadKind::Full,
        ),
        TaskDefinition::builtin(
            BUILD_ICON_SPRITE,
            TaskAction::IconSprite,
            vec![icon_glob],
            ReloadKind::Full,
        ),
        TaskDefinition::group(BUILD, &[BUILD_SCRIPTS, BUILD_STYLES]),
        TaskDefinition::group(DEFAULT, &[RUN_DEV_SCRIPTS, RUN_DEV_STYLES]),
    ];

    for (name, task) in custom {
        defs.push(TaskDefinition {
            name: name.clone(),
            action: TaskAction::Command(task.cmd.clone()),
            after: task.after.clone(),
            watch: task.watch.clone(),
            reload: if task.reload {
                ReloadKind::Full
            } else {
                ReloadKind::None
            },
        });
    }

    defs
}
