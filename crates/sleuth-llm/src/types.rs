//! Core types for LLM requests and responses.
//!
//! The shapes follow the Anthropic Messages API: a conversation is a list of
//! role-tagged messages whose content is either plain text or an ordered list
//! of text, tool-use and tool-result blocks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ResponseValidationError;

// ─────────────────────────────────────────────────────────────────────────────
// Completion Request
// ─────────────────────────────────────────────────────────────────────────────

/// A completion request to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use for completion.
    pub model: String,

    /// The messages in the conversation.
    pub messages: Vec<Message>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// System prompt (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Tools available for the model to use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

}

impl CompletionRequest {
    /// Create a new completion request with the given model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            system: None,
            tools: Vec::new(),
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Add tools to the request.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Whether any tools are offered to the model.
    pub fn offers_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,

    /// The content of the message.
    pub content: Content,
}

impl Message {
    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Create an assistant message with content blocks.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Blocks(blocks),
        }
    }

    /// Create a user message with tool results.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(results.into_iter().map(|r| r.into()).collect()),
        }
    }
}

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content - either a simple string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Simple text content.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Get the text content if this is simple text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Blocks(_) => None,
        }
    }

    /// Borrow the structured blocks, empty for plain text.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content Blocks
// ─────────────────────────────────────────────────────────────────────────────

/// A content block in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Tool use request from the assistant.
    ToolUse {
        /// Unique ID for this tool use.
        id: String,
        /// Name of the tool to use.
        name: String,
        /// Input arguments for the tool.
        input: serde_json::Value,
    },
    /// Tool result from the user.
    ToolResult {
        /// ID of the tool use this is a result for.
        tool_use_id: String,
        /// The serialized result.
        content: String,
        /// Whether the tool execution resulted in an error.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Create a text content block.
    pub fn text(content: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: content.into(),
        }
    }

    /// Create a tool use content block.
    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The answer to one tool_use block, correlated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the tool use this is a result for.
    pub tool_use_id: String,
    /// The serialized result.
    pub content: String,
    /// Whether the tool execution resulted in an error.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultBlock {
    /// Create a successful tool result.
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error tool result.
    pub fn error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: error.into(),
            is_error: true,
        }
    }
}

impl From<ToolResultBlock> for ContentBlock {
    fn from(block: ToolResultBlock) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: block.tool_use_id,
            content: block.content,
            is_error: block.is_error,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Definition of a tool available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Response
// ─────────────────────────────────────────────────────────────────────────────

/// A completion response from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique ID for this response.
    pub id: String,

    /// The role (always "assistant").
    pub role: Role,

    /// The content blocks in the response, in the order the model produced them.
    pub content: Vec<ContentBlock>,

    /// The model that generated the response.
    pub model: String,

    /// Why the model stopped generating.
    pub stop_reason: Option<StopReason>,

    /// Token usage statistics.
    pub usage: Usage,
}

impl CompletionResponse {
    /// Create a new completion response.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content,
            model: model.into(),
            stop_reason: Some(stop_reason),
            usage,
        }
    }

    /// Iterate over the text segments in order.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Get the concatenated text content from the response.
    pub fn text(&self) -> String {
        self.text_segments().collect::<Vec<_>>().join("")
    }

    /// Check if the response contains tool use requests.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    /// Whether the model finished its turn on its own.
    pub fn is_end_turn(&self) -> bool {
        self.stop_reason == Some(StopReason::EndTurn)
    }

    /// Validate the response structure.
    ///
    /// Checks that the id and model are present and that every tool_use block
    /// carries a unique, non-empty id so its result can be correlated. Tool
    /// names and inputs are left to the tool registry, which answers bad ones
    /// with an error result. All problems are reported at once.
    pub fn validate(&self) -> Result<(), ResponseValidationError> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push(ResponseValidationError::missing_field("id"));
        }

        if self.model.trim().is_empty() {
            errors.push(ResponseValidationError::missing_field("model"));
        }

        let mut seen_tool_ids: HashSet<&str> = HashSet::new();
        for block in &self.content {
            if let ContentBlock::ToolUse { id, .. } = block
                && let Some(err) = validate_tool_use_id(id, &mut seen_tool_ids)
            {
                errors.push(err);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ResponseValidationError::Multiple(errors)),
        }
    }

    /// Validate and return the response, or return an error.
    pub fn validated(self) -> Result<Self, ResponseValidationError> {
        self.validate()?;
        Ok(self)
    }
}

fn validate_tool_use_id<'a>(
    id: &'a str,
    seen_tool_ids: &mut HashSet<&'a str>,
) -> Option<ResponseValidationError> {
    if id.trim().is_empty() {
        return Some(ResponseValidationError::invalid_tool_use(
            id,
            "id cannot be empty",
        ));
    }

    if !seen_tool_ids.insert(id) {
        return Some(ResponseValidationError::invalid_tool_use(
            id,
            "duplicate tool_use id",
        ));
    }

    None
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response.
    EndTurn,
    /// Model wants to use a tool.
    ToolUse,
    /// Hit max_tokens limit.
    MaxTokens,
    /// Hit a stop sequence.
    StopSequence,
}

/// Token usage statistics for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the input.
    pub input_tokens: u32,
    /// Tokens in the output.
    pub output_tokens: u32,
}

impl Usage {
    /// Create new usage statistics.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> CompletionResponse {
        CompletionResponse::new("msg_1", "claude-test", content, stop_reason, Usage::new(1, 2))
    }

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content.as_text(), Some("Hello"));
        assert!(msg.content.blocks().is_empty());
    }

    #[test]
    fn test_tool_results_message() {
        let msg = Message::tool_results(vec![
            ToolResultBlock::success("t1", "{\"ok\":true}"),
            ToolResultBlock::error("t2", "{\"error\":\"boom\"}"),
        ]);
        assert_eq!(msg.role, Role::User);
        let blocks = msg.content.blocks();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(
            &blocks[1],
            ContentBlock::ToolResult { tool_use_id, is_error: true, .. } if tool_use_id == "t2"
        ));
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("claude-test", vec![Message::user("hi")], 1024)
            .with_system("be brief")
            .with_tools(vec![ToolDefinition::new(
                "web_search",
                "Search",
                json!({"type": "object"}),
            )]);

        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert!(request.offers_tools());
    }

    #[test]
    fn test_request_without_tools_omits_field() {
        let request = CompletionRequest::new("claude-test", vec![Message::user("hi")], 16);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("system").is_none());
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::tool_use("t1", "fetch_content", json!({"url": "https://a"}));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["name"], "fetch_content");

        let result: ContentBlock = ToolResultBlock::success("t1", "done").into();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert!(value.get("is_error").is_none());
    }

    #[test]
    fn test_response_text_segments_in_order() {
        let resp = response(
            vec![
                ContentBlock::text("first"),
                ContentBlock::tool_use("t1", "web_search", json!({"query": "x"})),
                ContentBlock::text("second"),
            ],
            StopReason::ToolUse,
        );
        let segments: Vec<&str> = resp.text_segments().collect();
        assert_eq!(segments, vec!["first", "second"]);
        assert_eq!(resp.text(), "firstsecond");
        assert!(resp.has_tool_use());
        assert!(!resp.is_end_turn());
    }

    #[test]
    fn test_usage() {
        let usage = Usage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_validate_valid_response() {
        let resp = response(vec![ContentBlock::text("Hello")], StopReason::EndTurn);
        assert!(resp.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_id() {
        let mut resp = response(vec![ContentBlock::text("Hello")], StopReason::EndTurn);
        resp.id = "  ".to_string();
        assert!(matches!(
            resp.validate(),
            Err(ResponseValidationError::MissingField { field: "id" })
        ));
    }

    #[test]
    fn test_validate_tool_use_duplicate_ids() {
        let resp = response(
            vec![
                ContentBlock::tool_use("t1", "web_search", json!({})),
                ContentBlock::tool_use("t1", "web_search", json!({})),
            ],
            StopReason::ToolUse,
        );
        let err = resp.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate tool_use id"));
    }

    #[test]
    fn test_validate_leaves_tool_names_and_inputs_to_the_caller() {
        let resp = response(
            vec![
                ContentBlock::tool_use("t1", "search.web", json!({"query": "q"})),
                ContentBlock::tool_use("t2", "web_search", json!("not an object")),
                ContentBlock::tool_use("t3", "", json!({})),
            ],
            StopReason::ToolUse,
        );
        assert!(resp.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_tool_use_id() {
        let resp = response(
            vec![ContentBlock::tool_use(" ", "web_search", json!({}))],
            StopReason::ToolUse,
        );
        let err = resp.validate().unwrap_err();
        assert!(err.to_string().contains("id cannot be empty"));
    }

    #[test]
    fn test_validate_tool_use_stop_reason_without_tools() {
        let resp = response(vec![ContentBlock::text("no tools")], StopReason::ToolUse);
        assert!(resp.validate().is_ok());
    }

    #[test]
    fn test_validated_convenience() {
        let resp = response(vec![ContentBlock::text("ok")], StopReason::EndTurn);
        assert_eq!(resp.validated().unwrap().text(), "ok");
    }
}
