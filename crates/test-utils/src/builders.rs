#![allow(dead_code)]

use devloop::config::model::BuildCommands;
use devloop::config::{validate_config, ConfigFile, Settings};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(bin: &str) -> Self {
        let mut config = ConfigFile::default();
        config.build.bin = Some(bin.to_string());
        Self { config }
    }

    pub fn with_build(mut self, cmd: &str) -> Self {
        self.config.build.cmd = Some(BuildCommands::One(cmd.to_string()));
        self
    }

    pub fn with_ports(mut self, port: u16, target: u16) -> Self {
        self.config.proxy.port = port;
        self.config.proxy.target = target;
        self
    }

    pub fn with_interval(mut self, interval: &str) -> Self {
        self.config.watcher.interval = interval.to_string();
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.config
            .watcher
            .exclude
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn with_exclude_regex(mut self, pattern: &str) -> Self {
        self.config
            .watcher
            .exclude_regex
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn raw(self) -> ConfigFile {
        self.config
    }

    pub fn build(self) -> Settings {
        validate_config(&self.config).expect("Failed to build valid settings from builder")
    }
}
