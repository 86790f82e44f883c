#![allow(dead_code)]

use assetdag::config::{ConfigFile, RawConfigFile, TaskConfig};
use assetdag::types::TriggerWhileRunningBehaviour;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the same defaults as an empty `Assetdag.toml`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_behaviour(mut self, behaviour: TriggerWhileRunningBehaviour) -> Self {
        self.config.config.triggered_while_running_behaviour = behaviour;
        self
    }

    pub fn with_queue_length(mut self, len: usize) -> Self {
        self.config.config.queue_length = len;
        self
    }

    pub fn with_local_server(mut self, base_dirs: &[&str]) -> Self {
        self.config.dev_server.local_server_enabled = true;
        self.config.dev_server.base_dirs = base_dirs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_proxy(mut self, target: &str) -> Self {
        self.config.dev_server.proxy_enabled = true;
        self.config.dev_server.proxy_target = Some(target.to_string());
        self
    }

    /// Bind to an ephemeral port so parallel tests don't collide.
    pub fn with_ephemeral_port(mut self) -> Self {
        self.config.dev_server.port = 0;
        self
    }

    /// Escape hatch for anything without a dedicated method.
    pub fn edit(mut self, f: impl FnOnce(&mut RawConfigFile)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                watch: vec![],
                reload: false,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task.watch.push(pattern.to_string());
        self
    }

    pub fn reload(mut self) -> Self {
        self.task.reload = true;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
