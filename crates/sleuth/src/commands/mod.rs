//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;
use sleuth_config::{LoadOptions, LoadedConfig, Settings};

pub mod config;
pub mod research;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Config file named with `--config`.
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Discover config layers and apply environment overrides.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let mut loaded = sleuth_config::load_config_with_options(LoadOptions {
            explicit_file: self.config_path.clone(),
            ..Default::default()
        })?;
        sleuth_config::apply_env(&mut loaded.config)?;
        Ok(loaded)
    }

    /// Resolve flat settings from every config layer.
    pub fn settings(&self) -> Result<(LoadedConfig, Settings)> {
        let loaded = self.load_config()?;
        let settings = Settings::resolve(&loaded.config);
        Ok((loaded, settings))
    }
}
