//! Tool framework for research capabilities.
//!
//! This module defines the [`Tool`] trait that every capability implements,
//! and the [`ToolRegistry`] the research loop dispatches through.
//!
//! # Example
//!
//! ```rust,ignore
//! use sleuth_agent::{Tool, ToolContext, ToolResult, ToolRegistry};
//!
//! struct Clock;
//!
//! #[async_trait]
//! impl Tool for Clock {
//!     fn name(&self) -> &str { "clock" }
//!     fn description(&self) -> &str { "Returns the current time" }
//!     fn parameters(&self) -> Value { json!({"type": "object"}) }
//!
//!     async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
//!         Ok(ToolResult::json(json!({"now": "12:00"})))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Clock);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::types::SessionId;

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for tool parameter validation failures.
///
/// Messages are written for the model: they say what was wrong and how to
/// fix it, since they come back to it as a tool result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterValidationError {
    /// A required parameter is missing.
    #[error("missing required parameter '{name}': {hint}")]
    MissingRequired {
        /// The parameter name.
        name: &'static str,
        /// Hint for the model on how to fix.
        hint: &'static str,
    },

    /// A parameter value is out of range.
    #[error("'{name}' value {value} is out of range: {constraint}")]
    OutOfRange {
        /// The parameter name.
        name: &'static str,
        /// The actual value as string.
        value: String,
        /// Description of the valid range.
        constraint: String,
    },

    /// A parameter value is not acceptable.
    #[error("'{name}' has invalid value '{value}': {message}")]
    InvalidValue {
        /// The parameter name.
        name: &'static str,
        /// The invalid value.
        value: String,
        /// Why it's invalid.
        message: String,
    },
}

impl ParameterValidationError {
    /// Create a missing required parameter error.
    pub fn missing(name: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { name, hint }
    }

    /// Create an out of range error.
    pub fn out_of_range(
        name: &'static str,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        name: &'static str,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl From<ParameterValidationError> for AgentError {
    fn from(err: ParameterValidationError) -> Self {
        AgentError::InvalidToolParams(err.to_string())
    }
}

/// Result type for parameter validation.
pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

/// Helper trait for extracting parameters from JSON.
pub trait ParamExt {
    /// Get a required string parameter.
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str>;

    /// Get an optional u64 parameter with default.
    fn optional_u64(&self, name: &str, default: u64) -> u64;

    /// Get an optional boolean parameter with default.
    fn optional_bool(&self, name: &str, default: bool) -> bool;
}

impl ParamExt for serde_json::Value {
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str> {
        self.get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParameterValidationError::missing(name, hint))
    }

    fn optional_u64(&self, name: &str, default: u64) -> u64 {
        self.get(name).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    fn optional_bool(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed Parameter Structs
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of search results when the model does not ask for a count.
pub const DEFAULT_NUM_RESULTS: u64 = 5;

/// Validated parameters for the `web_search` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSearchParams {
    /// The search query.
    pub query: String,
    /// Number of results requested.
    pub num_results: u64,
}

impl TryFrom<serde_json::Value> for WebSearchParams {
    type Error = ParameterValidationError;

    fn try_from(params: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        let query = params.required_str("query", "provide a search query")?;
        if query.trim().is_empty() {
            return Err(ParameterValidationError::invalid_value(
                "query",
                query,
                "query cannot be empty",
            ));
        }

        let num_results = params.optional_u64("num_results", DEFAULT_NUM_RESULTS);
        if num_results == 0 {
            return Err(ParameterValidationError::out_of_range(
                "num_results",
                num_results,
                "must be at least 1",
            ));
        }

        Ok(Self {
            query: query.trim().to_string(),
            num_results,
        })
    }
}

/// Validated parameters for the `fetch_content` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchContentParams {
    /// The page to fetch.
    pub url: url::Url,
    /// Whether to return the page's outbound links.
    pub extract_links: bool,
}

impl TryFrom<serde_json::Value> for FetchContentParams {
    type Error = ParameterValidationError;

    fn try_from(params: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        let raw = params.required_str("url", "provide the URL to fetch")?;
        let url = url::Url::parse(raw.trim()).map_err(|e| {
            ParameterValidationError::invalid_value("url", raw, format!("Invalid URL: {}", e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ParameterValidationError::invalid_value(
                "url",
                raw,
                "Only HTTP and HTTPS URLs are supported",
            ));
        }

        Ok(Self {
            url,
            extract_links: params.optional_bool("extract_links", false),
        })
    }
}

/// Truncate to at most `max_chars` characters, never splitting a character.
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for research tools.
///
/// Each tool defines its parameters as a JSON Schema and implements async
/// execution. Failures the model can act on should come back as
/// [`ToolResult::error`]; an `Err` is also tolerated and is reported to the
/// model the same way.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of this tool.
    fn name(&self) -> &str;

    /// Get a human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for this tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Whether successful results are fetched documents that count as sources.
    ///
    /// A fetch-type tool returns JSON with a `content` string and optionally a
    /// `title`; the invocation's `url` argument identifies the source.
    fn produces_sources(&self) -> bool {
        false
    }

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// ID of the research session this tool is running in.
    pub session_id: SessionId,
    /// Loop iteration that requested the call (1-based).
    pub iteration: u32,
    /// Correlation id of the tool call.
    pub tool_call_id: String,
    /// Token to check for cancellation.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Create a new tool context.
    pub fn new(
        session_id: SessionId,
        iteration: u32,
        tool_call_id: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            iteration,
            tool_call_id: tool_call_id.into(),
            cancellation,
        }
    }

    /// Check if execution has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(SessionId::new(), 1, "", CancellationToken::new())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    /// Successful text output.
    Text {
        /// The text content.
        content: String,
    },
    /// Successful JSON output.
    Json {
        /// The JSON content.
        content: serde_json::Value,
    },
    /// Tool execution failed.
    Error {
        /// Error message.
        message: String,
    },
}

impl ToolResult {
    /// Create a text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a JSON result.
    pub fn json(content: serde_json::Value) -> Self {
        Self::Json { content }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Check if this result is an error.
    ///
    /// JSON results that carry an `error` field count as errors too.
    pub fn is_error(&self) -> bool {
        match self {
            Self::Error { .. } => true,
            Self::Json { content } => content.get("error").is_some(),
            Self::Text { .. } => false,
        }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Get a string field of a JSON result.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Json { content } => content.get(name).and_then(|v| v.as_str()),
            _ => None,
        }
    }

    /// The serialized form placed in the transcript.
    ///
    /// JSON is compact, text is passed through, errors become
    /// `{"error": "<message>"}` so every result reads the same way.
    pub fn to_transcript(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Json { content } => content.to_string(),
            Self::Error { message } => serde_json::json!({ "error": message }).to_string(),
        }
    }

    /// Approximate size of the serialized result, for logging.
    pub fn content_size(&self) -> usize {
        match self {
            Self::Text { content } => content.len(),
            Self::Json { content } => content.to_string().len(),
            Self::Error { message } => message.len(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of the tools offered to the model.
///
/// Tools keep their registration order, which is the order their descriptors
/// are sent to the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// If a tool with the same name already exists, it is replaced in place.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a tool from an Arc.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get all tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Convert all tools to LLM tool definitions.
    pub fn to_llm_definitions(&self) -> Vec<sleuth_llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| {
                sleuth_llm::ToolDefinition::new(tool.name(), tool.description(), tool.parameters())
            })
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Never fails: an unknown name or a tool that returns `Err` produces an
    /// error result the model can read.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(
                session_id = %ctx.session_id,
                iteration = ctx.iteration,
                tool = %name,
                tool_call_id = %ctx.tool_call_id,
                "Unknown tool requested"
            );
            return ToolResult::error(format!("unknown tool: {}", name));
        };

        match tool.execute(params, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    iteration = ctx.iteration,
                    tool = %name,
                    error = %e,
                    "Tool execution failed"
                );
                ToolResult::error(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A mock tool for testing.
///
/// Returns a configurable response (or failure) and records every call.
#[cfg(test)]
#[derive(Debug)]
pub struct MockTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    produces_sources: bool,
    response: parking_lot::Mutex<std::result::Result<ToolResult, String>>,
    calls: parking_lot::Mutex<Vec<serde_json::Value>>,
    iterations: parking_lot::Mutex<Vec<u32>>,
}

#[cfg(test)]
impl MockTool {
    /// Create a new mock tool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "A mock tool for testing".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            produces_sources: false,
            response: parking_lot::Mutex::new(Ok(ToolResult::text("mock response"))),
            calls: parking_lot::Mutex::new(Vec::new()),
            iterations: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the tool as fetch-type.
    pub fn fetching(mut self) -> Self {
        self.produces_sources = true;
        self
    }

    /// Set the response to return.
    pub fn with_response(self, response: ToolResult) -> Self {
        *self.response.lock() = Ok(response);
        self
    }

    /// Make every call fail with `Err(AgentError::Tool(message))`.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.response.lock() = Err(message.into());
        self
    }

    /// Get the calls that were made to this tool.
    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().clone()
    }

    /// Loop iteration of each call, in call order.
    pub fn iterations(&self) -> Vec<u32> {
        self.iterations.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    fn produces_sources(&self) -> bool {
        self.produces_sources
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult> {
        self.calls.lock().push(params);
        self.iterations.lock().push(ctx.iteration);
        self.response.lock().clone().map_err(AgentError::Tool)
    }
}

// Arc<MockTool> lets tests keep a handle for assertions after registering.
#[cfg(test)]
#[async_trait]
impl Tool for Arc<MockTool> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn description(&self) -> &str {
        self.as_ref().description()
    }

    fn parameters(&self) -> serde_json::Value {
        self.as_ref().parameters()
    }

    fn produces_sources(&self) -> bool {
        self.as_ref().produces_sources()
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult> {
        self.as_ref().execute(params, ctx).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
