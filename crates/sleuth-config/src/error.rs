//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// API key not found through any resolution method.
    #[error(
        "{env_var} environment variable is required. Get your API key from https://console.anthropic.com/ or set api_key in the [llm] section"
    )]
    ApiKeyNotFound { env_var: String },

    /// API key is present but obviously malformed.
    #[error("{env_var} appears to be invalid ({reason})")]
    InvalidApiKey { env_var: String, reason: String },

    /// A numeric setting is outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// The model identifier is not usable.
    #[error("model name '{0}' appears to be invalid")]
    InvalidModel(String),

    /// An environment variable could not be parsed.
    #[error("invalid integer value for {var}: {value}")]
    InvalidEnvValue { var: String, value: String },
}
