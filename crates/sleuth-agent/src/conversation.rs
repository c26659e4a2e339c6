//! Conversation state for one research session.
//!
//! The transcript is sent in full on every LLM call and only ever grows.
//! Every tool invocation in an assistant entry must be answered by the
//! tool-result entry that follows it before the next call is made.

use std::collections::HashSet;

use sleuth_llm::{
    CompletionRequest, ContentBlock, Message, Role, ToolDefinition, ToolResultBlock,
};

use crate::prompt::initial_message;
use crate::types::ResearchConfig;

/// Ordered transcript of user, assistant and tool-result entries.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation seeded with the research query.
    pub fn new(query: &str) -> Self {
        Self {
            messages: vec![Message::user(initial_message(query))],
        }
    }

    /// Append a plain user entry.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant entry. Empty entries are dropped.
    pub fn push_assistant(&mut self, blocks: Vec<ContentBlock>) {
        if !blocks.is_empty() {
            self.messages.push(Message::assistant_blocks(blocks));
        }
    }

    /// Append a tool-result batch. Empty batches are dropped.
    pub fn push_tool_results(&mut self, results: Vec<ToolResultBlock>) {
        if !results.is_empty() {
            self.messages.push(Message::tool_results(results));
        }
    }

    /// All entries in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no entries.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool invocation ids in the last assistant entry that have no result yet.
    pub fn unanswered_tool_calls(&self) -> Vec<String> {
        let Some(last_assistant) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[last_assistant + 1..]
            .iter()
            .flat_map(|m| m.content.blocks())
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();

        self.messages[last_assistant]
            .content
            .blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } if !answered.contains(id.as_str()) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Build the request for the next LLM call.
    ///
    /// An empty `tools` list produces a request that offers no tools.
    pub fn request(&self, config: &ResearchConfig, tools: Vec<ToolDefinition>) -> CompletionRequest {
        CompletionRequest::new(&config.model, self.messages.clone(), config.max_tokens)
            .with_system(&config.system_prompt)
            .with_tools(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seeded_with_query() {
        let conversation = Conversation::new("tides");
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::User);
        assert_eq!(
            conversation.messages()[0].content.as_text(),
            Some("Research this topic efficiently: tides")
        );
    }

    #[test]
    fn test_empty_entries_are_dropped() {
        let mut conversation = Conversation::new("q");
        conversation.push_assistant(Vec::new());
        conversation.push_tool_results(Vec::new());
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_unanswered_tool_calls() {
        let mut conversation = Conversation::new("q");
        assert!(conversation.unanswered_tool_calls().is_empty());

        conversation.push_assistant(vec![
            ContentBlock::text("Searching"),
            ContentBlock::tool_use("toolu_1", "web_search", json!({"query": "q"})),
            ContentBlock::tool_use("toolu_2", "fetch_content", json!({"url": "https://a"})),
        ]);
        assert_eq!(
            conversation.unanswered_tool_calls(),
            vec!["toolu_1".to_string(), "toolu_2".to_string()]
        );

        conversation.push_tool_results(vec![ToolResultBlock::success("toolu_1", "{}")]);
        assert_eq!(conversation.unanswered_tool_calls(), vec!["toolu_2".to_string()]);

        conversation.push_tool_results(vec![ToolResultBlock::error("toolu_2", "{}")]);
        assert!(conversation.unanswered_tool_calls().is_empty());
    }

    #[test]
    fn test_request_carries_config_and_tools() {
        let conversation = Conversation::new("q");
        let config = ResearchConfig::new("claude-haiku-3-5-20241022").with_max_tokens(512);
        let tools = vec![ToolDefinition::new(
            "web_search",
            "Search",
            json!({"type": "object"}),
        )];

        let request = conversation.request(&config, tools);
        assert_eq!(request.model, "claude-haiku-3-5-20241022");
        assert_eq!(request.max_tokens, 512);
        assert!(request.offers_tools());
        assert_eq!(request.system.as_deref(), Some(config.system_prompt.as_str()));
        assert_eq!(request.messages.len(), 1);

        let forced = conversation.request(&config, Vec::new());
        assert!(!forced.offers_tools());
    }
}
