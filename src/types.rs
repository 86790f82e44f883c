use std::fmt;

use serde::Deserialize;

/// Behaviour when a new trigger arrives while a DAG run is already in progress.
///
/// - `Queue`: remember the trigger and start a new DAG run when the current one
///   finishes (default behaviour).
/// - `Cancel`: drop any previously queued run and only keep the latest
///   trigger. The in-flight run is never interrupted; only what runs
///   *afterwards* changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerWhileRunningBehaviour {
    #[default]
    Queue,
    Cancel,
}

/// Which flavour of output a pipeline produces.
///
/// Passed explicitly to every script/style invocation; nothing global is
/// flipped before a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Readable output plus sourcemaps.
    Development,
    /// Minified output, no sourcemaps.
    Production,
}

impl BuildMode {
    pub fn is_production(self) -> bool {
        matches!(self, BuildMode::Production)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Development => f.write_str("development"),
            BuildMode::Production => f.write_str("production"),
        }
    }
}

/// What connected browsers should do after a change.
///
/// Ordered so that combining several kinds is a `max`: a run that touched
/// both stylesheets and scripts needs a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ReloadKind {
    /// Nothing visible changed.
    #[default]
    None,
    /// Only stylesheets changed; swap them in place.
    InjectCss,
    /// Reload the whole page.
    Full,
}

impl ReloadKind {
    /// Guess the reload kind for a changed file from its extension.
    pub fn for_path(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".css") {
            ReloadKind::InjectCss
        } else {
            ReloadKind::Full
        }
    }

    /// SSE event name understood by the injected client script.
    pub fn event_name(self) -> Option<&'static str> {
        match self {
            ReloadKind::None => None,
            ReloadKind::InjectCss => Some("css"),
            ReloadKind::Full => Some("reload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_kinds_combine_with_max() {
        assert_eq!(ReloadKind::None.max(ReloadKind::InjectCss), ReloadKind::InjectCss);
        assert_eq!(ReloadKind::InjectCss.max(ReloadKind::Full), ReloadKind::Full);
    }

    #[test]
    fn reload_kind_from_extension() {
        assert_eq!(ReloadKind::for_path("dist/css/main.CSS"), ReloadKind::InjectCss);
        assert_eq!(ReloadKind::for_path("templates/index.html"), ReloadKind::Full);
    }
}
