//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/sleuth/config.toml` (user config)
//! 2. `./sleuth.toml` (project-local)
//! 3. `--config <path>` (explicit file)
//! 4. `SLEUTH_*` environment variables (see [`crate::env`])
//! 5. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, SleuthConfig};

/// Default config filename for project-local config.
pub const PROJECT_CONFIG_FILE: &str = "sleuth.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "sleuth";

/// Environment variable to override the config directory.
///
/// When set, this takes precedence over the platform default.
pub const CONFIG_DIR_ENV: &str = "SLEUTH_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: SleuthConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discovery options.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory searched for `sleuth.toml`; the working directory when `None`.
    pub project_dir: Option<PathBuf>,
    /// User config directory; [`user_config_dir`] when `None`.
    pub config_dir: Option<PathBuf>,
    /// A file named on the command line. Failing to read or parse it is an
    /// error, unlike the discovered layers.
    pub explicit_file: Option<PathBuf>,
}

/// Load configuration by discovering and merging the default layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(LoadOptions {
        project_dir: project_dir.map(Path::to_path_buf),
        ..Default::default()
    })
}

/// Load configuration with explicit control over every layer location.
pub fn load_config_with_options(options: LoadOptions) -> Result<LoadedConfig> {
    let mut config = SleuthConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config: explicit override, then env var, then platform default
    let user_config_path = match &options.config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    // 2. Project-local config
    let project_path = options
        .project_dir
        .as_ref()
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    // 3. Explicit file
    if let Some(path) = options.explicit_file {
        config.merge(load_config_file(&path)?);
        sources.push(ConfigSource { path, loaded: true });
    }

    check_plaintext_keys(&config, &mut warnings);

    for warning in &warnings {
        tracing::warn!(%warning, "Config warning");
    }
    tracing::debug!(
        loaded = sources.iter().filter(|s| s.loaded).count(),
        checked = sources.len(),
        "Config layers resolved"
    );

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<SleuthConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SleuthConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &SleuthConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for sleuth.
///
/// Checks `SLEUTH_CONFIG_DIR` first, then falls back to the platform default
/// (`~/.config/sleuth` on Linux, `~/Library/Application Support/sleuth` on macOS).
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped quietly; an unreadable or malformed one becomes
/// a warning.
fn load_layer(config: &mut SleuthConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Check for plaintext secrets in the config and emit warnings.
fn check_plaintext_keys(config: &SleuthConfig, warnings: &mut Vec<String>) {
    if config.llm.as_ref().is_some_and(|l| l.has_plaintext_api_key()) {
        warnings.push(
            "[llm] contains a plaintext API key. \
             Consider setting ANTHROPIC_API_KEY instead."
                .to_string(),
        );
    }

    if config
        .tools
        .as_ref()
        .and_then(|t| t.search_api_key.as_deref())
        .is_some_and(|k| !k.is_empty())
    {
        warnings.push(
            "[tools] contains a plaintext search API key. \
             Consider setting SLEUTH_BRAVE_API_KEY instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
