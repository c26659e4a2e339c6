//! Configuration system for Sleuth.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (user config + project-local + explicit file)
//! - `SLEUTH_*` environment overrides
//! - API key resolution (env var → config file)
//! - Up-front validation of every bound the research loop relies on

pub mod discovery;
pub mod env;
pub mod error;
pub mod secrets;
pub mod settings;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadOptions, LoadedConfig, PROJECT_CONFIG_FILE, load_config,
    load_config_file, load_config_with_options, save_config, user_config_dir, user_config_path,
};
pub use env::{apply_env, apply_env_from};
pub use error::{ConfigError, Result};
pub use secrets::{ANTHROPIC_API_KEY_ENV, ResolvedSecret, SecretSource};
pub use settings::Settings;
pub use types::*;
