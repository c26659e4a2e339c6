//! Environment variable overrides.
//!
//! Applied after the file layers and before CLI flags. Lookups go through a
//! closure so callers (and tests) decide where variables come from.

use std::path::PathBuf;

use crate::{ConfigError, Result, SleuthConfig};

/// Model identifier override.
pub const MODEL_ENV: &str = "SLEUTH_MODEL";
/// Output-token cap override.
pub const MAX_TOKENS_ENV: &str = "SLEUTH_MAX_TOKENS";
/// Search result cap override.
pub const MAX_RESULTS_ENV: &str = "SLEUTH_MAX_RESULTS";
/// Iteration ceiling override.
pub const MAX_ITERATIONS_ENV: &str = "SLEUTH_MAX_ITERATIONS";
/// Tool timeout override, in seconds.
pub const TIMEOUT_ENV: &str = "SLEUTH_TIMEOUT";
/// Output directory override.
pub const OUTPUT_DIR_ENV: &str = "SLEUTH_OUTPUT_DIR";
/// Save toggle override.
pub const SAVE_RESULTS_ENV: &str = "SLEUTH_SAVE_RESULTS";
/// Brave Search key.
pub const BRAVE_API_KEY_ENV: &str = "SLEUTH_BRAVE_API_KEY";

/// Apply `SLEUTH_*` variables from the process environment.
pub fn apply_env(config: &mut SleuthConfig) -> Result<()> {
    apply_env_from(config, |var| std::env::var(var).ok())
}

/// Apply `SLEUTH_*` variables using the given lookup.
///
/// Empty values are ignored. A value that should be an integer but is not
/// is an error rather than a silent fallback.
pub fn apply_env_from<F>(config: &mut SleuthConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(model) = get(MODEL_ENV) {
        config.llm_mut().model = Some(model);
    }
    if let Some(value) = get(MAX_TOKENS_ENV) {
        config.llm_mut().max_tokens = Some(parse_int(MAX_TOKENS_ENV, &value)?);
    }
    if let Some(value) = get(MAX_RESULTS_ENV) {
        config.tools_mut().max_search_results = Some(parse_int(MAX_RESULTS_ENV, &value)?);
    }
    if let Some(value) = get(MAX_ITERATIONS_ENV) {
        config.research_mut().max_iterations = Some(parse_int(MAX_ITERATIONS_ENV, &value)?);
    }
    if let Some(value) = get(TIMEOUT_ENV) {
        config.tools_mut().timeout_secs = Some(parse_int(TIMEOUT_ENV, &value)?);
    }
    if let Some(dir) = get(OUTPUT_DIR_ENV) {
        config.output_mut().dir = Some(PathBuf::from(dir));
    }
    if let Some(value) = get(SAVE_RESULTS_ENV) {
        config.output_mut().save = Some(parse_bool(&value));
    }
    if let Some(key) = get(BRAVE_API_KEY_ENV) {
        config.tools_mut().search_api_key = Some(key);
    }

    Ok(())
}

fn parse_int<T: std::str::FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
