//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]        # model, token cap, credentials, retry policy
//! [research]   # loop budget
//! [tools]      # search provider, result cap, per-call timeout
//! [output]     # where and how results are saved
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Default output-token cap per LLM call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default retry count for transient LLM failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default loop iteration ceiling.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
/// Default cap on results returned by a search.
pub const DEFAULT_MAX_SEARCH_RESULTS: u32 = 10;
/// Default per-tool-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default directory for saved results.
pub const DEFAULT_OUTPUT_DIR: &str = "research_output";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Maps to one TOML config file. Every field is optional so that partial
/// layers (a project-local override, say) can be merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleuthConfig {
    /// LLM provider settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSection>,

    /// Research loop settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research: Option<ResearchSection>,

    /// Built-in tool settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsSection>,

    /// Result output settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
}

impl SleuthConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with every non-secret field set to its default, as written
    /// by `sleuth config init`.
    pub fn with_defaults() -> Self {
        Self {
            llm: Some(LlmSection {
                model: Some(DEFAULT_MODEL.to_string()),
                max_tokens: Some(DEFAULT_MAX_TOKENS),
                api_key: None,
                base_url: None,
                max_retries: Some(DEFAULT_MAX_RETRIES),
            }),
            research: Some(ResearchSection {
                max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            }),
            tools: Some(ToolsSection {
                max_search_results: Some(DEFAULT_MAX_SEARCH_RESULTS),
                timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
                search_provider: Some(SearchProvider::default()),
                search_api_key: None,
            }),
            output: Some(OutputSection {
                dir: Some(PathBuf::from(DEFAULT_OUTPUT_DIR)),
                save: Some(true),
                format: Some(OutputFormat::default()),
            }),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging happens per field: a later layer that sets only
    /// `llm.model` keeps the earlier layer's `llm.api_key`.
    pub fn merge(&mut self, other: SleuthConfig) {
        merge_section(&mut self.llm, other.llm, LlmSection::merge);
        merge_section(&mut self.research, other.research, ResearchSection::merge);
        merge_section(&mut self.tools, other.tools, ToolsSection::merge);
        merge_section(&mut self.output, other.output, OutputSection::merge);
    }

    /// Mutable access to the `[llm]` section, creating it if absent.
    pub fn llm_mut(&mut self) -> &mut LlmSection {
        self.llm.get_or_insert_with(Default::default)
    }

    /// Mutable access to the `[research]` section, creating it if absent.
    pub fn research_mut(&mut self) -> &mut ResearchSection {
        self.research.get_or_insert_with(Default::default)
    }

    /// Mutable access to the `[tools]` section, creating it if absent.
    pub fn tools_mut(&mut self) -> &mut ToolsSection {
        self.tools.get_or_insert_with(Default::default)
    }

    /// Mutable access to the `[output]` section, creating it if absent.
    pub fn output_mut(&mut self) -> &mut OutputSection {
        self.output.get_or_insert_with(Default::default)
    }
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
    match (base.as_mut(), other) {
        (Some(existing), Some(layer)) => merge(existing, layer),
        (None, Some(layer)) => *base = Some(layer),
        (_, None) => {}
    }
}

/// Overwrite `base` when `other` is set.
fn take<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[llm]` section.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Output-token cap per call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// API key stored in the file (plaintext, discouraged).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Alternate API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Retries for transient failures. Zero disables retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl std::fmt::Debug for LlmSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSection")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmSection {
    fn merge(&mut self, other: LlmSection) {
        take(&mut self.model, other.model);
        take(&mut self.max_tokens, other.max_tokens);
        take(&mut self.api_key, other.api_key);
        take(&mut self.base_url, other.base_url);
        take(&mut self.max_retries, other.max_retries);
    }

    /// Returns true if an API key is stored directly in the file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// `[research]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    /// Iteration ceiling for one research session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl ResearchSection {
    fn merge(&mut self, other: ResearchSection) {
        take(&mut self.max_iterations, other.max_iterations);
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Upper bound on results a single search may return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_search_results: Option<u32>,

    /// Per-call timeout for network tools, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Which search backend `web_search` uses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_provider: Option<SearchProvider>,

    /// Key for providers that need one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,
}

impl ToolsSection {
    fn merge(&mut self, other: ToolsSection) {
        take(&mut self.max_search_results, other.max_search_results);
        take(&mut self.timeout_secs, other.timeout_secs);
        take(&mut self.search_provider, other.search_provider);
        take(&mut self.search_api_key, other.search_api_key);
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory results are saved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Whether results are saved at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<bool>,

    /// File format for saved results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl OutputSection {
    fn merge(&mut self, other: OutputSection) {
        take(&mut self.dir, other.dir);
        take(&mut self.save, other.save);
        take(&mut self.format, other.format);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Search backend used by the `web_search` tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    /// DuckDuckGo HTML results, no key required.
    #[default]
    DuckDuckGo,
    /// Brave Search API, requires `search_api_key`.
    Brave,
}

impl SearchProvider {
    /// Whether the provider needs an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Brave)
    }
}

impl std::fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuckDuckGo => write!(f, "duckduckgo"),
            Self::Brave => write!(f, "brave"),
        }
    }
}

/// File format for saved research results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}
