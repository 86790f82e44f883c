// src/config/validate.rs

use std::collections::HashSet;

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::registry::{build_definitions, TaskDefinition, BUILTIN_TASKS};
use crate::errors::{AssetdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_dev_server(cfg)?;
    validate_output_names(cfg)?;
    validate_custom_tasks(cfg)?;

    let defs = build_definitions(&cfg.scripts, &cfg.styles, &cfg.media, &cfg.task);
    validate_task_dependencies(&defs)?;
    validate_dag(&defs)?;
    validate_globs(cfg, &defs)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.queue_length == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Only the contradiction is checked here; "no mode at all" is fine until
/// something actually starts the dev server.
fn validate_dev_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.dev_server.proxy_enabled && cfg.dev_server.local_server_enabled {
        return Err(AssetdagError::ConfigError(
            "[dev_server] proxy_enabled and local_server_enabled are mutually exclusive"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_output_names(cfg: &RawConfigFile) -> Result<()> {
    let names = [
        ("[scripts].output_filename", Some(&cfg.scripts.output_filename)),
        ("[scripts].production_filename", cfg.scripts.production_filename.as_ref()),
        ("[styles].output_filename", Some(&cfg.styles.output_filename)),
        ("[styles].production_filename", cfg.styles.production_filename.as_ref()),
        ("[media].sprite_filename", Some(&cfg.media.sprite_filename)),
    ];

    for (field, value) in names {
        if let Some(value) = value {
            if value.trim().is_empty() || value.contains('/') || value.contains('\\') {
                return Err(AssetdagError::ConfigError(format!(
                    "{field} must be a plain file name (got '{value}')"
                )));
            }
        }
    }
    Ok(())
}

fn validate_custom_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if BUILTIN_TASKS.contains(&name.as_str()) {
            return Err(AssetdagError::ConfigError(format!(
                "[task.{name}] shadows a built-in task"
            )));
        }
        if task.cmd.trim().is_empty() {
            return Err(AssetdagError::ConfigError(format!(
                "[task.{name}] has an empty `cmd`"
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(defs: &[TaskDefinition]) -> Result<()> {
    let known: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();

    for def in defs {
        for dep in def.after.iter() {
            if !known.contains(dep.as_str()) {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    def.name, dep
                )));
            }
            if dep == &def.name {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    def.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(defs: &[TaskDefinition]) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for def in defs {
        graph.add_node(def.name.as_str());
    }

    for def in defs {
        for dep in def.after.iter() {
            graph.add_edge(dep.as_str(), def.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(AssetdagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}

fn validate_globs(cfg: &RawConfigFile, defs: &[TaskDefinition]) -> Result<()> {
    let task_globs = defs
        .iter()
        .flat_map(|d| d.watch.iter().map(move |g| (d.name.as_str(), g)));
    let exclude_globs = cfg.watch.exclude.iter().map(|g| ("[watch].exclude", g));
    let reload_globs = cfg
        .dev_server
        .watched_files
        .iter()
        .map(|g| ("[dev_server].watched_files", g));

    for (owner, pattern) in task_globs.chain(exclude_globs).chain(reload_globs) {
        Glob::new(pattern).map_err(|e| {
            AssetdagError::ConfigError(format!("invalid glob '{pattern}' in {owner}: {e}"))
        })?;
    }
    Ok(())
}
