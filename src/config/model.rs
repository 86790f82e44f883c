// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::registry::{build_definitions, TaskDefinition};
use crate::errors::{AssetdagError, Result};
use crate::types::TriggerWhileRunningBehaviour;

const SRC_DIR: &str = "assets/src";
const DIST_DIR: &str = "assets/dist";

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [dev_server]
/// proxy_enabled = true
/// proxy_target = "http://www.your-url.com"
///
/// [scripts]
/// entry_file = "assets/src/js/main.js"
///
/// [task.lint]
/// cmd = "npx stylelint 'assets/src/scss/**/*.scss'"
/// after = ["run-dev-styles"]
/// ```
///
/// All sections are optional and have defaults matching the
/// `assets/src` -> `assets/dist` layout.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Runtime behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Watcher tuning from `[watch]`.
    #[serde(default)]
    pub watch: WatchSection,

    /// Dev server / live reload from `[dev_server]`.
    #[serde(default)]
    pub dev_server: DevServerConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub styles: StylesConfig,

    #[serde(default)]
    pub media: MediaConfig,

    /// Extra shell tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    watch: WatchSection,
    dev_server: DevServerConfig,
    scripts: ScriptsConfig,
    styles: StylesConfig,
    media: MediaConfig,
    task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            watch: raw.watch,
            dev_server: raw.dev_server,
            scripts: raw.scripts,
            styles: raw.styles,
            media: raw.media,
            task: raw.task,
        }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.config
    }

    pub fn watch_section(&self) -> &WatchSection {
        &self.watch
    }

    pub fn dev_server(&self) -> &DevServerConfig {
        &self.dev_server
    }

    pub fn scripts(&self) -> &ScriptsConfig {
        &self.scripts
    }

    pub fn styles(&self) -> &StylesConfig {
        &self.styles
    }

    pub fn media(&self) -> &MediaConfig {
        &self.media
    }

    /// Custom `[task.<name>]` entries.
    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    /// Built-in task definitions plus the custom ones, in a stable order.
    pub fn task_definitions(&self) -> Vec<TaskDefinition> {
        build_definitions(
            &self.scripts,
            &self.styles,
            &self.media,
            &self.task,
        )
    }

    /// Directories that tasks write into, relative to the project root.
    ///
    /// The watcher ignores changes below these so that outputs never
    /// retrigger builds.
    pub fn output_dirs(&self) -> Vec<String> {
        vec![
            self.scripts.output_dir.clone(),
            self.styles.output_dir.clone(),
            self.media.image_output_dir.clone(),
            self.media.icon_output_dir.clone(),
        ]
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigSection {
    /// `"queue"` (default) or `"cancel"`.
    pub triggered_while_running_behaviour: TriggerWhileRunningBehaviour,

    /// Maximum number of queued runs to remember while a run is active.
    pub queue_length: usize,
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            triggered_while_running_behaviour: TriggerWhileRunningBehaviour::Queue,
            queue_length: 1,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Quiet period after the last change before a binding fires.
    pub debounce_ms: u64,

    /// Skip a trigger when the watched content hashes the same as last time.
    pub use_hash: bool,

    /// Patterns never considered by any binding.
    pub exclude: Vec<String>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            use_hash: false,
            exclude: vec!["**/node_modules/**".to_string()],
        }
    }
}

/// `[dev_server]` section.
///
/// Exactly one of `proxy_enabled` / `local_server_enabled` must be set for
/// `watch` to start; see [`DevServerConfig::mode`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevServerConfig {
    pub proxy_enabled: bool,
    /// Site to forward to in proxy mode, e.g. `http://www.your-url.com`.
    pub proxy_target: Option<String>,
    pub local_server_enabled: bool,
    /// Directories served in local-server mode, searched in order.
    pub base_dirs: Vec<String>,
    /// Extra globs (templates etc.) whose changes reload the browser
    /// without running a task.
    pub watched_files: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            proxy_enabled: false,
            proxy_target: None,
            local_server_enabled: false,
            base_dirs: Vec::new(),
            watched_files: vec![
                "templates/*.html".to_string(),
                "templates/**/*.html".to_string(),
            ],
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Resolved dev-server mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevServerMode {
    /// Forward everything to an externally running site.
    Proxy { target: String },
    /// Serve files straight from these directories.
    Local { base_dirs: Vec<String> },
}

impl DevServerConfig {
    /// Resolve the single active mode, or explain why there isn't one.
    pub fn mode(&self) -> Result<DevServerMode> {
        match (self.proxy_enabled, self.local_server_enabled) {
            (true, true) => Err(AssetdagError::ConfigError(
                "[dev_server] proxy_enabled and local_server_enabled are mutually exclusive"
                    .to_string(),
            )),
            (false, false) => Err(AssetdagError::ConfigError(
                "[dev_server] needs either proxy_enabled = true or local_server_enabled = true"
                    .to_string(),
            )),
            (true, false) => match self.proxy_target.as_deref().map(str::trim) {
                Some(target) if !target.is_empty() => Ok(DevServerMode::Proxy {
                    target: normalize_target(target),
                }),
                _ => Err(AssetdagError::ConfigError(
                    "[dev_server] proxy_enabled requires a non-empty proxy_target".to_string(),
                )),
            },
            (false, true) => {
                if self.base_dirs.is_empty() {
                    Err(AssetdagError::ConfigError(
                        "[dev_server] local_server_enabled requires at least one entry in base_dirs"
                            .to_string(),
                    ))
                } else {
                    Ok(DevServerMode::Local {
                        base_dirs: self.base_dirs.clone(),
                    })
                }
            }
        }
    }
}

/// Accept bare hosts like `www.your-url.com` the way the old config did.
fn normalize_target(target: &str) -> String {
    let trimmed = target.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// `[scripts]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Everything that should retrigger the bundle when changed.
    pub source_glob: String,
    /// Module the bundle starts from.
    pub entry_file: String,
    pub output_dir: String,
    pub output_filename: String,
    /// File name for production builds; falls back to `output_filename`.
    pub production_filename: Option<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            source_glob: format!("{SRC_DIR}/js/**/*.js"),
            entry_file: format!("{SRC_DIR}/js/main.js"),
            output_dir: format!("{DIST_DIR}/js"),
            output_filename: "main.js".to_string(),
            production_filename: None,
        }
    }
}

impl ScriptsConfig {
    pub fn filename_for(&self, production: bool) -> &str {
        match (&self.production_filename, production) {
            (Some(name), true) => name,
            _ => &self.output_filename,
        }
    }
}

/// `[styles]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub source_glob: String,
    /// Stylesheet compiled into the single output file.
    pub main_file: String,
    pub output_dir: String,
    pub output_filename: String,
    pub production_filename: Option<String>,
    /// Extra directories searched by `@use` / `@import`.
    pub include_paths: Vec<String>,
    /// Browserslist queries the prefixer targets.
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            source_glob: format!("{SRC_DIR}/scss/**/*.scss"),
            main_file: format!("{SRC_DIR}/scss/style.scss"),
            output_dir: format!("{DIST_DIR}/css"),
            output_filename: "main.css".to_string(),
            production_filename: None,
            include_paths: Vec::new(),
            browsers: vec!["last 2 versions".to_string()],
        }
    }
}

impl StylesConfig {
    pub fn filename_for(&self, production: bool) -> &str {
        match (&self.production_filename, production) {
            (Some(name), true) => name,
            _ => &self.output_filename,
        }
    }
}

/// `[media]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub image_source_dir: String,
    pub image_output_dir: String,
    pub icon_source_dir: String,
    pub icon_output_dir: String,
    pub sprite_filename: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_source_dir: format!("{SRC_DIR}/img"),
            image_output_dir: format!("{DIST_DIR}/img"),
            icon_source_dir: format!("{SRC_DIR}/icons"),
            icon_output_dir: format!("{DIST_DIR}/icons"),
            sprite_filename: "icons.svg".to_string(),
        }
    }
}

/// `[task.<name>]` section: a shell command wired into the graph.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// The command to execute (through `sh -c` / `cmd /C`).
    pub cmd: String,

    /// This task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Globs that retrigger this task in watch mode.
    #[serde(default)]
    pub watch: Vec<String>,

    /// Whether a successful run should reload connected browsers.
    #[serde(default)]
    pub reload: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_server(proxy: bool, local: bool) -> DevServerConfig {
        DevServerConfig {
            proxy_enabled: proxy,
            proxy_target: Some("www.your-url.com".to_string()),
            local_server_enabled: local,
            base_dirs: vec!["public".to_string()],
            ..DevServerConfig::default()
        }
    }

    #[test]
    fn neither_mode_is_a_config_error() {
        assert!(matches!(
            dev_server(false, false).mode(),
            Err(AssetdagError::ConfigError(_))
        ));
    }

    #[test]
    fn both_modes_is_a_config_error() {
        assert!(matches!(
            dev_server(true, true).mode(),
            Err(AssetdagError::ConfigError(_))
        ));
    }

    #[test]
    fn proxy_target_gets_a_scheme() {
        assert_eq!(
            dev_server(true, false).mode().unwrap(),
            DevServerMode::Proxy {
                target: "http://www.your-url.com".to_string()
            }
        );
    }

    #[test]
    fn local_mode_requires_base_dirs() {
        let mut cfg = dev_server(false, true);
        cfg.base_dirs.clear();
        assert!(cfg.mode().is_err());
    }

    #[test]
    fn empty_toml_uses_layout_defaults() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        assert_eq!(raw.scripts.entry_file, "assets/src/js/main.js");
        assert_eq!(raw.styles.output_dir, "assets/dist/css");
        assert_eq!(raw.media.sprite_filename, "icons.svg");
        assert_eq!(raw.config.queue_length, 1);
        assert_eq!(raw.watch.debounce_ms, 200);
    }

    #[test]
    fn production_filename_falls_back() {
        let mut scripts = ScriptsConfig::default();
        assert_eq!(scripts.filename_for(true), "main.js");
        scripts.production_filename = Some("main.min.js".to_string());
        assert_eq!(scripts.filename_for(true), "main.min.js");
        assert_eq!(scripts.filename_for(false), "main.js");
    }
}
