//! Resolved, validated settings for one research run.
//!
//! [`Settings::resolve`] flattens the merged file/env layers and fills in
//! defaults. The CLI then applies its flags directly to the fields and calls
//! [`Settings::validate`] before anything touches the network.

use std::path::PathBuf;

use crate::secrets::{ANTHROPIC_API_KEY_ENV, ResolvedSecret, resolve_api_key};
use crate::types::*;
use crate::{ConfigError, Result};

/// Shortest API key accepted.
const MIN_API_KEY_LEN: usize = 20;
/// Shortest model identifier accepted.
const MIN_MODEL_LEN: usize = 5;

/// Flat view of the configuration with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Model identifier.
    pub model: String,
    /// Output-token cap per LLM call.
    pub max_tokens: u32,
    /// Anthropic API key and where it came from.
    pub api_key: Option<ResolvedSecret>,
    /// Alternate API base URL.
    pub base_url: Option<String>,
    /// Retries for transient LLM failures.
    pub max_retries: u32,
    /// Iteration ceiling.
    pub max_iterations: u32,
    /// Cap on results per search.
    pub max_search_results: u32,
    /// Per-call tool timeout, in seconds.
    pub timeout_secs: u64,
    /// Search backend.
    pub search_provider: SearchProvider,
    /// Key for the search backend, if it needs one.
    pub search_api_key: Option<String>,
    /// Directory results are saved to.
    pub output_dir: PathBuf,
    /// Whether results are saved.
    pub save: bool,
    /// Format for saved results.
    pub format: OutputFormat,
}

impl Settings {
    /// Resolve settings from a merged config, reading the API key from the
    /// process environment.
    pub fn resolve(config: &SleuthConfig) -> Self {
        Self::resolve_with(config, |var| std::env::var(var).ok())
    }

    /// Resolve settings using the given environment lookup for the API key.
    pub fn resolve_with<F>(config: &SleuthConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm = config.llm.clone().unwrap_or_default();
        let research = config.research.clone().unwrap_or_default();
        let tools = config.tools.clone().unwrap_or_default();
        let output = config.output.clone().unwrap_or_default();

        let api_key = resolve_api_key(ANTHROPIC_API_KEY_ENV, llm.api_key.as_deref(), lookup);

        Self {
            model: llm.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            api_key,
            base_url: llm.base_url,
            max_retries: llm.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_iterations: research.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            max_search_results: tools
                .max_search_results
                .unwrap_or(DEFAULT_MAX_SEARCH_RESULTS),
            timeout_secs: tools.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            search_provider: tools.search_provider.unwrap_or_default(),
            search_api_key: tools.search_api_key,
            output_dir: output
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            save: output.save.unwrap_or(true),
            format: output.format.unwrap_or_default(),
        }
    }

    /// Check credentials and numeric bounds. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ConfigError::ApiKeyNotFound {
                env_var: ANTHROPIC_API_KEY_ENV.to_string(),
            })?;
        if key.value.chars().count() < MIN_API_KEY_LEN {
            return Err(ConfigError::InvalidApiKey {
                env_var: ANTHROPIC_API_KEY_ENV.to_string(),
                reason: "too short".to_string(),
            });
        }

        check_range("max_tokens", self.max_tokens.into(), 1, 200_000)?;
        check_range("max_search_results", self.max_search_results.into(), 1, 50)?;
        check_range("max_iterations", self.max_iterations.into(), 1, 50)?;
        check_range("timeout", self.timeout_secs, 1, 300)?;
        check_range("max_retries", self.max_retries.into(), 0, 10)?;

        if self.model.trim().chars().count() < MIN_MODEL_LEN {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.search_provider.requires_api_key()
            && self
                .search_api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingField {
                field: "search_api_key".to_string(),
                context: format!("[tools] (required by the {} provider)", self.search_provider),
            });
        }

        Ok(())
    }

    /// The validated API key value, if present.
    pub fn api_key_value(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.value.as_str())
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretSource;

    const KEY: &str = "sk-ant-REDACTED";

    fn settings_with_key() -> Settings {
        Settings::resolve_with(&SleuthConfig::new(), |_| Some(KEY.to_string()))
    }

    #[test]
    fn test_defaults() {
        let settings = settings_with_key();
        assert_eq!(settings.model, "claude-sonnet-4-20250514");
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.max_search_results, 10);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.output_dir, PathBuf::from("research_output"));
        assert!(settings.save);
        assert_eq!(settings.format, OutputFormat::Json);
        assert_eq!(settings.search_provider, SearchProvider::DuckDuckGo);
        assert_eq!(settings.api_key_value(), Some(KEY));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_resolve_uses_file_values() {
        let config = SleuthConfig::from_toml(
            "[llm]\nmodel = \"claude-opus-4-20250514\"\napi_key = \"sk-ant-file-key-0123456789\"\n[research]\nmax_iterations = 12\n",
        )
        .unwrap();
        let settings = Settings::resolve_with(&config, |_| None);
        assert_eq!(settings.model, "claude-opus-4-20250514");
        assert_eq!(settings.max_iterations, 12);
        assert_eq!(
            settings.api_key.as_ref().unwrap().source,
            SecretSource::ConfigFile
        );
    }

    #[test]
    fn test_missing_api_key() {
        let settings = Settings::resolve_with(&SleuthConfig::new(), |_| None);
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ApiKeyNotFound { .. }));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_short_api_key() {
        let settings = Settings::resolve_with(&SleuthConfig::new(), |_| Some("short".to_string()));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn test_ranges() {
        let mut settings = settings_with_key();
        settings.max_iterations = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { field: "max_iterations", .. })
        ));

        let mut settings = settings_with_key();
        settings.max_iterations = 50;
        assert!(settings.validate().is_ok());
        settings.max_iterations = 51;
        assert!(settings.validate().is_err());

        let mut settings = settings_with_key();
        settings.max_tokens = 200_001;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { field: "max_tokens", .. })
        ));

        let mut settings = settings_with_key();
        settings.max_search_results = 51;
        assert!(settings.validate().is_err());

        let mut settings = settings_with_key();
        settings.timeout_secs = 301;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { field: "timeout", .. })
        ));
    }

    #[test]
    fn test_max_retries_bounded() {
        let mut settings = settings_with_key();
        settings.max_retries = 0;
        assert!(settings.validate().is_ok());
        settings.max_retries = 10;
        assert!(settings.validate().is_ok());

        settings.max_retries = 1000;
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { field: "max_retries", .. }
        ));
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_invalid_model() {
        let mut settings = settings_with_key();
        settings.model = "abc".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_brave_requires_key() {
        let mut settings = settings_with_key();
        settings.search_provider = SearchProvider::Brave;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField { .. })
        ));

        settings.search_api_key = Some("brave-key".to_string());
        assert!(settings.validate().is_ok());
    }
}
