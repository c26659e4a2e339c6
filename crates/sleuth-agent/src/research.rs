//! The research loop.
//!
//! A session calls the LLM with the transcript and all tool descriptors,
//! executes any requested tools, and repeats until the model wraps its
//! answer in a completion marker, ends its turn without tools, or runs out
//! of iterations. In the last case one more call, with no tools offered,
//! asks for a best-effort summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sleuth_llm::{
    CompletionResponse, ContentBlock, LlmBackend, SharedBackend, ToolDefinition, ToolResultBlock,
};
use tokio_util::sync::CancellationToken;

use crate::conversation::Conversation;
use crate::error::{AgentError, Result};
use crate::marker::extract_completion;
use crate::prompt::{empty_result_summary, fallback_summary};
use crate::tool::{Tool, ToolContext, ToolRegistry, ToolResult, truncate_chars};
use crate::types::{ResearchConfig, ResearchResult, SessionId, SourceRecord};
use crate::usage::UsageLedger;

/// Characters of fetched content kept as a raw finding.
pub const MAX_FINDING_CHARS: usize = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// Research Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Drives research sessions against an LLM backend and a set of tools.
///
/// The agent holds no per-session state, so one instance can serve many
/// sessions concurrently.
pub struct ResearchAgent {
    /// LLM backend for completions.
    backend: SharedBackend,
    /// Tools offered to the model.
    tools: Arc<ToolRegistry>,
    /// Loop configuration.
    config: ResearchConfig,
}

impl ResearchAgent {
    /// Create a new agent with the given backend and tools.
    pub fn new(backend: SharedBackend, tools: ToolRegistry, config: ResearchConfig) -> Self {
        Self {
            backend,
            tools: Arc::new(tools),
            config,
        }
    }

    /// Create an agent builder for fluent construction.
    pub fn builder() -> ResearchAgentBuilder {
        ResearchAgentBuilder::new()
    }

    /// Get the loop configuration.
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Get the tool registry.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get the LLM backend.
    pub fn backend(&self) -> SharedBackend {
        self.backend.clone()
    }

    /// Research a query to completion or until the iteration ceiling.
    ///
    /// Tool failures are reported to the model and never end the session;
    /// LLM failures do.
    pub async fn research(&self, query: &str) -> Result<ResearchResult> {
        self.research_with_cancellation(query, CancellationToken::new())
            .await
    }

    /// Research a query, stopping before the next LLM call once `cancellation`
    /// fires.
    ///
    /// The token is also handed to tools through their [`ToolContext`].
    pub async fn research_with_cancellation(
        &self,
        query: &str,
        cancellation: CancellationToken,
    ) -> Result<ResearchResult> {
        ResearchSession::new(self, query, cancellation).run().await
    }

    /// Research a query within a wall-clock limit.
    pub async fn research_with_timeout(
        &self,
        query: &str,
        limit: Duration,
    ) -> Result<ResearchResult> {
        tokio::time::timeout(limit, self.research(query))
            .await
            .map_err(|_| {
                tracing::warn!(limit_secs = limit.as_secs_f64(), "Research timed out");
                AgentError::Timeout(limit)
            })?
    }
}

impl std::fmt::Debug for ResearchAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchAgent")
            .field("backend", &self.backend.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// State owned by a single `research()` call.
struct ResearchSession<'a> {
    agent: &'a ResearchAgent,
    id: SessionId,
    query: String,
    conversation: Conversation,
    sources: Vec<SourceRecord>,
    raw_findings: Vec<String>,
    usage: UsageLedger,
    cancellation: CancellationToken,
}

impl<'a> ResearchSession<'a> {
    fn new(agent: &'a ResearchAgent, query: &str, cancellation: CancellationToken) -> Self {
        Self {
            agent,
            id: SessionId::new(),
            query: query.to_string(),
            conversation: Conversation::new(query),
            sources: Vec::new(),
            raw_findings: Vec::new(),
            usage: UsageLedger::new(&agent.config.model),
            cancellation,
        }
    }

    async fn run(mut self) -> Result<ResearchResult> {
        let ceiling = self.agent.config.max_iterations;
        let tool_definitions = self.agent.tools.to_llm_definitions();

        tracing::info!(
            session_id = %self.id,
            query = %self.query,
            model = %self.agent.config.model,
            max_iterations = ceiling,
            tools = %self.agent.tools.names().join(", "),
            "Research started"
        );

        for iteration in 1..=ceiling {
            let response = self.call_llm(iteration, tool_definitions.clone()).await?;

            let mut assistant_blocks = Vec::with_capacity(response.content.len());
            let mut tool_results = Vec::new();
            let mut last_text: Option<&str> = None;

            for block in &response.content {
                match block {
                    ContentBlock::Text { text } => {
                        assistant_blocks.push(block.clone());
                        if let Some(summary) = extract_completion(text) {
                            return Ok(self.finish(summary, iteration, true));
                        }
                        last_text = Some(text.as_str());
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        assistant_blocks.push(block.clone());
                        tool_results.push(self.dispatch(iteration, id, name, input).await);
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }

            let invoked_tools = !tool_results.is_empty();
            if invoked_tools {
                tracing::info!(
                    session_id = %self.id,
                    iteration,
                    tool_count = tool_results.len(),
                    sources = self.sources.len(),
                    "Tool batch completed"
                );
            }

            self.conversation.push_assistant(assistant_blocks);
            self.conversation.push_tool_results(tool_results);

            if response.is_end_turn() && !invoked_tools {
                let summary = last_text.unwrap_or_default().to_string();
                return Ok(self.finish(summary, iteration, true));
            }
        }

        self.force_summary(ceiling).await
    }

    /// One LLM call; the only place tokens are accumulated.
    async fn call_llm(
        &mut self,
        iteration: u32,
        tools: Vec<ToolDefinition>,
    ) -> Result<CompletionResponse> {
        if self.cancellation.is_cancelled() {
            tracing::warn!(session_id = %self.id, iteration, "Research cancelled");
            return Err(AgentError::Cancelled);
        }

        let unanswered = self.conversation.unanswered_tool_calls();
        if !unanswered.is_empty() {
            return Err(AgentError::internal(format!(
                "tool calls without results: {}",
                unanswered.join(", ")
            )));
        }

        let request = self.conversation.request(&self.agent.config, tools);
        tracing::debug!(
            session_id = %self.id,
            iteration,
            messages = request.messages.len(),
            offers_tools = request.offers_tools(),
            model = %request.model,
            "Calling LLM"
        );

        let started = Instant::now();
        let response = self.agent.backend.complete(request).await.map_err(|e| {
            tracing::error!(session_id = %self.id, iteration, error = %e, "LLM call failed");
            AgentError::from(e)
        })?;

        self.usage.record(&response.usage);

        tracing::debug!(
            session_id = %self.id,
            iteration,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            has_tool_use = response.has_tool_use(),
            duration_ms = started.elapsed().as_millis() as u64,
            "LLM response received"
        );

        Ok(response)
    }

    /// Execute one tool request and produce its correlated result.
    async fn dispatch(
        &mut self,
        iteration: u32,
        id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> ToolResultBlock {
        let ctx = ToolContext::new(self.id, iteration, id, self.cancellation.clone());
        let started = Instant::now();
        let result = self.agent.tools.execute(name, input.clone(), &ctx).await;

        tracing::debug!(
            session_id = %self.id,
            iteration,
            tool = %name,
            tool_call_id = %id,
            success = result.is_success(),
            result_size = result.content_size(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool executed"
        );

        let content = result.to_transcript();
        if result.is_error() {
            tracing::warn!(
                session_id = %self.id,
                iteration,
                tool = %name,
                tool_call_id = %id,
                error = %content,
                "Tool returned an error"
            );
            return ToolResultBlock::error(id, content);
        }

        if self
            .agent
            .tools
            .get(name)
            .is_some_and(|tool| tool.produces_sources())
        {
            self.record_source(input, &result);
        }

        ToolResultBlock::success(id, content)
    }

    /// Record a source and its finding for a successful fetch with content.
    fn record_source(&mut self, input: &serde_json::Value, result: &ToolResult) {
        let Some(content) = result.str_field("content").filter(|c| !c.is_empty()) else {
            return;
        };

        let url = input.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        let title = result.str_field("title").unwrap_or_default();

        self.sources.push(SourceRecord::new(url, title));
        self.raw_findings
            .push(truncate_chars(content, MAX_FINDING_CHARS).0.to_string());
    }

    /// Ask for a summary without tools after the ceiling is reached.
    async fn force_summary(mut self, ceiling: u32) -> Result<ResearchResult> {
        tracing::warn!(
            session_id = %self.id,
            iterations = ceiling,
            sources = self.sources.len(),
            "Iteration ceiling reached, forcing summary"
        );

        let prompt = self.agent.config.summarize_prompt.clone();
        self.conversation.push_user(prompt);
        let response = self.call_llm(ceiling, Vec::new()).await?;

        let summary = response
            .text_segments()
            .next()
            .map(|text| extract_completion(text).unwrap_or_else(|| text.to_string()))
            .unwrap_or_default();

        let summary = if !summary.trim().is_empty() {
            summary
        } else if !self.raw_findings.is_empty() {
            tracing::warn!(session_id = %self.id, "Forced summary was empty, using raw findings");
            fallback_summary(&self.query, &self.sources, &self.raw_findings)
        } else {
            empty_result_summary(&self.query)
        };

        Ok(self.finish(summary, ceiling, false))
    }

    fn finish(self, summary: String, iterations: u32, completed: bool) -> ResearchResult {
        tracing::info!(
            session_id = %self.id,
            iterations,
            completed,
            sources = self.sources.len(),
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            cost_usd = self.usage.cost(),
            "Research finished"
        );

        ResearchResult {
            query: self.query,
            summary,
            sources: self.sources,
            raw_findings: self.raw_findings,
            iterations,
            usage: self.usage,
            completed,
            finished_at: chrono::Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ResearchAgent`].
pub struct ResearchAgentBuilder {
    backend: Option<SharedBackend>,
    tools: ToolRegistry,
    config: ResearchConfig,
}

impl ResearchAgentBuilder {
    /// Create a new builder with default configuration and no tools.
    pub fn new() -> Self {
        Self {
            backend: None,
            tools: ToolRegistry::new(),
            config: ResearchConfig::default(),
        }
    }

    /// Set the LLM backend.
    pub fn with_backend(mut self, backend: impl LlmBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set a shared LLM backend.
    pub fn with_shared_backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Register a single tool.
    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    /// Replace the loop configuration.
    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set max tokens per call.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the iteration ceiling.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Build the agent.
    pub fn build(self) -> Result<ResearchAgent> {
        let backend = self
            .backend
            .ok_or_else(|| AgentError::config("LLM backend is required"))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::config("max_iterations must be at least 1"));
        }

        Ok(ResearchAgent::new(backend, self.tools, self.config))
    }
}

impl Default for ResearchAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::SUMMARIZE_PROMPT;
    use crate::tool::MockTool;
    use async_trait::async_trait;
    use serde_json::json;
    use sleuth_llm::{
        CompletionRequest, Content, MockBackend, MockResponse, Role, StopReason, Usage,
    };

    fn response(content: Vec<ContentBlock>, stop: StopReason) -> CompletionResponse {
        CompletionResponse::new("msg_1", "test-model", content, stop, Usage::new(100, 50))
    }

    fn text_response(text: &str) -> CompletionResponse {
        response(vec![ContentBlock::text(text)], StopReason::EndTurn)
    }

    fn fetch_response(id: &str, url: &str) -> CompletionResponse {
        response(
            vec![ContentBlock::tool_use(id, "fetch_content", json!({"url": url}))],
            StopReason::ToolUse,
        )
    }

    fn fetch_tool(title: &str, content: &str) -> Arc<MockTool> {
        Arc::new(
            MockTool::new("fetch_content")
                .fetching()
                .with_response(ToolResult::json(json!({"title": title, "content": content}))),
        )
    }

    fn agent(backend: &Arc<MockBackend>, tools: Vec<Arc<MockTool>>, ceiling: u32) -> ResearchAgent {
        let mut builder = ResearchAgent::builder()
            .with_shared_backend(backend.clone())
            .with_max_iterations(ceiling);
        for tool in tools {
            builder = builder.with_tool(tool);
        }
        builder.build().unwrap()
    }

    /// Tool-result blocks of the last message sent in a request.
    fn last_tool_results(request: &CompletionRequest) -> Vec<(String, String, bool)> {
        let last = request.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        last.content
            .blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some((tool_use_id.clone(), content.clone(), *is_error)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_builder_requires_backend() {
        let err = ResearchAgent::builder().build().unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_zero_ceiling() {
        let err = ResearchAgent::builder()
            .with_backend(MockBackend::with_text("x"))
            .with_max_iterations(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_builder_settings() {
        let agent = ResearchAgent::builder()
            .with_backend(MockBackend::with_text("x"))
            .with_model("claude-haiku-3-5-20241022")
            .with_max_tokens(1000)
            .with_max_iterations(7)
            .with_tool(MockTool::new("web_search"))
            .build()
            .unwrap();

        assert_eq!(agent.config().model, "claude-haiku-3-5-20241022");
        assert_eq!(agent.config().max_tokens, 1000);
        assert_eq!(agent.config().max_iterations, 7);
        assert_eq!(agent.tools().names(), vec!["web_search"]);
        assert!(format!("{:?}", agent).contains("mock"));
    }

    #[tokio::test]
    async fn test_marker_on_first_turn() {
        let backend = Arc::new(MockBackend::new(vec![text_response(
            "<research_complete>Paris is the capital of France.</research_complete>",
        )]));
        let agent = agent(&backend, vec![], 5);

        let result = agent.research("capital of France").await.unwrap();

        assert_eq!(result.summary, "Paris is the capital of France.");
        assert_eq!(result.iterations, 1);
        assert!(result.completed);
        assert!(result.sources.is_empty());
        assert!(result.raw_findings.is_empty());
        assert_eq!(result.query, "capital of France");
        assert_eq!(backend.request_count(), 1);

        let request = &backend.requests()[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(
            request.messages[0].content.as_text(),
            Some("Research this topic efficiently: capital of France")
        );
        assert!(request.system.as_deref().unwrap().contains("<research_complete>"));
    }

    #[tokio::test]
    async fn test_fetch_then_marker_records_source() {
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://example.com/a"),
            text_response("<research_complete>Done.</research_complete>"),
        ]));
        let fetch = fetch_tool("A", "lorem ipsum...");
        let agent = agent(&backend, vec![fetch.clone()], 5);

        let result = agent.research("lorem").await.unwrap();

        assert_eq!(result.summary, "Done.");
        assert_eq!(result.iterations, 2);
        assert!(result.completed);
        assert_eq!(
            result.sources,
            vec![SourceRecord::new("https://example.com/a", "A")]
        );
        assert_eq!(result.raw_findings, vec!["lorem ipsum...".to_string()]);
        assert_eq!(fetch.call_count(), 1);
        assert_eq!(fetch.calls()[0]["url"], "https://example.com/a");

        let second = &backend.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        let results = last_tool_results(second);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "toolu_1");
        assert!(!results[0].2);
        let content: serde_json::Value = serde_json::from_str(&results[0].1).unwrap();
        assert_eq!(content["title"], "A");
    }

    #[tokio::test]
    async fn test_ceiling_forces_summary_with_fallback() {
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://example.com/1"),
            fetch_response("toolu_2", "https://example.com/2"),
            fetch_response("toolu_3", "https://example.com/3"),
            response(vec![ContentBlock::text("")], StopReason::EndTurn),
        ]));
        let fetch = fetch_tool("Page", "finding text");
        let agent = agent(&backend, vec![fetch.clone()], 3);

        let result = agent.research("slow topic").await.unwrap();

        assert!(!result.completed);
        assert_eq!(result.iterations, 3);
        assert_eq!(fetch.iterations(), vec![1, 2, 3]);
        assert_eq!(result.sources.len(), 3);
        assert_eq!(result.raw_findings.len(), 3);
        assert!(result.summary.starts_with(
            "Research Summary: slow topic\n\nNote: Maximum iterations reached. Here's what was found:\n\n"
        ));
        assert!(result.summary.contains("From Page:\nfinding text\n\nSource: https://example.com/3\n\n"));

        assert_eq!(backend.request_count(), 4);
        let requests = backend.requests();
        assert!(requests[..3].iter().all(|r| r.offers_tools()));
        let forced = &requests[3];
        assert!(!forced.offers_tools());
        let last = forced.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(matches!(&last.content, Content::Text(t) if t == SUMMARIZE_PROMPT));
        assert_eq!(result.usage.total(), 4 * 150);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_and_loop_continues() {
        let backend = Arc::new(MockBackend::new(vec![
            response(
                vec![ContentBlock::tool_use("toolu_1", "nonexistent_tool", json!({}))],
                StopReason::ToolUse,
            ),
            text_response("<research_complete>Recovered.</research_complete>"),
        ]));
        let agent = agent(&backend, vec![], 5);

        let result = agent.research("q").await.unwrap();

        assert_eq!(result.summary, "Recovered.");
        assert_eq!(result.iterations, 2);
        let results = last_tool_results(&backend.requests()[1]);
        assert_eq!(
            results,
            vec![(
                "toolu_1".to_string(),
                r#"{"error":"unknown tool: nonexistent_tool"}"#.to_string(),
                true
            )]
        );
    }

    #[tokio::test]
    async fn test_malformed_tool_requests_are_answered_not_fatal() {
        let backend = Arc::new(MockBackend::new(vec![
            response(
                vec![
                    ContentBlock::tool_use("toolu_1", "search.web", json!({"query": "q"})),
                    ContentBlock::tool_use("toolu_2", "web_search", json!("q")),
                    ContentBlock::tool_use("toolu_3", "fetch_content", json!(["https://a"])),
                ],
                StopReason::ToolUse,
            ),
            text_response("<research_complete>Recovered.</research_complete>"),
        ]));
        let tools = crate::tools::default_registry(
            crate::tools::SearchProvider::DuckDuckGo,
            5,
            Duration::from_secs(5),
        )
        .unwrap();
        let agent = ResearchAgent::builder()
            .with_shared_backend(backend.clone())
            .with_tools(tools)
            .build()
            .unwrap();

        let result = agent.research("q").await.unwrap();

        assert!(result.completed);
        assert_eq!(result.summary, "Recovered.");
        assert_eq!(result.iterations, 2);
        assert!(result.sources.is_empty());
        assert_eq!(result.usage.total(), 2 * 150);

        let results = last_tool_results(&backend.requests()[1]);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, _, is_error)| *is_error));
        assert_eq!(results[0].1, r#"{"error":"unknown tool: search.web"}"#);
        assert!(results[1].1.contains("missing required parameter 'query'"));
        assert!(results[2].1.contains("missing required parameter 'url'"));
    }

    #[tokio::test]
    async fn test_forced_summary_extracts_marker() {
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://example.com/1"),
            text_response("Preamble <research_complete>Best effort.</research_complete>"),
        ]));
        let agent = agent(&backend, vec![fetch_tool("P", "x")], 1);

        let result = agent.research("q").await.unwrap();

        assert_eq!(result.summary, "Best effort.");
        assert!(!result.completed);
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn test_forced_summary_uses_raw_text_without_marker() {
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://example.com/1"),
            response(
                vec![
                    ContentBlock::text("First segment."),
                    ContentBlock::text("Second segment."),
                ],
                StopReason::EndTurn,
            ),
        ]));
        let agent = agent(&backend, vec![fetch_tool("P", "x")], 1);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.summary, "First segment.");
        assert!(!result.completed);
    }

    #[tokio::test]
    async fn test_forced_summary_without_findings_apologizes() {
        let search = Arc::new(
            MockTool::new("web_search").with_response(ToolResult::json(json!({"results": []}))),
        );
        let backend = Arc::new(MockBackend::new(vec![
            response(
                vec![ContentBlock::tool_use("toolu_1", "web_search", json!({"query": "q"}))],
                StopReason::ToolUse,
            ),
            response(vec![], StopReason::EndTurn),
        ]));
        let agent = agent(&backend, vec![search], 1);

        let result = agent.research("dark matter").await.unwrap();
        assert_eq!(
            result.summary,
            "Research on 'dark matter' was attempted but no results were gathered. Try a more specific query or increase max iterations."
        );
        assert!(!result.completed);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_marker_wins_over_later_tool_calls() {
        let fetch = fetch_tool("A", "content");
        let backend = Arc::new(MockBackend::new(vec![response(
            vec![
                ContentBlock::text("<research_complete>Already known.</research_complete>"),
                ContentBlock::tool_use("toolu_1", "fetch_content", json!({"url": "https://a"})),
            ],
            StopReason::ToolUse,
        )]));
        let agent = agent(&backend, vec![fetch.clone()], 5);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.summary, "Already known.");
        assert_eq!(fetch.call_count(), 0);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_tools_before_marker_run_in_order() {
        let fetch = fetch_tool("A", "content");
        let backend = Arc::new(MockBackend::new(vec![response(
            vec![
                ContentBlock::tool_use("toolu_1", "fetch_content", json!({"url": "https://a"})),
                ContentBlock::tool_use("toolu_2", "fetch_content", json!({"url": "https://b"})),
                ContentBlock::text("<research_complete>Summary</research_complete>"),
            ],
            StopReason::EndTurn,
        )]));
        let agent = agent(&backend, vec![fetch.clone()], 5);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(fetch.call_count(), 2);
        let urls: Vec<&str> = result.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://b"]);
    }

    #[tokio::test]
    async fn test_end_turn_without_tools_completes_with_last_text() {
        let backend = Arc::new(MockBackend::new(vec![response(
            vec![
                ContentBlock::text("Thinking out loud."),
                ContentBlock::text("The answer is 42."),
            ],
            StopReason::EndTurn,
        )]));
        let agent = agent(&backend, vec![], 5);

        let result = agent.research("meaning").await.unwrap();
        assert_eq!(result.summary, "The answer is 42.");
        assert!(result.completed);
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn test_max_tokens_stop_does_not_complete() {
        let backend = Arc::new(MockBackend::new(vec![
            response(vec![ContentBlock::text("Partial...")], StopReason::MaxTokens),
            text_response("<research_complete>Full.</research_complete>"),
        ]));
        let agent = agent(&backend, vec![], 5);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.summary, "Full.");
        assert_eq!(result.iterations, 2);

        let second = &backend.requests()[1];
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let backend = Arc::new(MockBackend::with_results(vec![
            MockResponse::Success(fetch_response("toolu_1", "https://a")),
            MockResponse::Error("connection reset".to_string()),
        ]));
        let agent = agent(&backend, vec![fetch_tool("A", "x")], 5);

        let err = agent.research("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_failing_tool_becomes_error_result() {
        let flaky = Arc::new(MockTool::new("fetch_content").fetching().failing("timed out"));
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://a"),
            text_response("<research_complete>Despite failures.</research_complete>"),
        ]));
        let agent = agent(&backend, vec![flaky], 5);

        let result = agent.research("q").await.unwrap();

        assert!(result.completed);
        assert!(result.sources.is_empty());
        assert_eq!(result.usage.total(), 300);
        let results = last_tool_results(&backend.requests()[1]);
        assert!(results[0].2);
        assert!(results[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn test_sources_only_from_fetch_tools_with_content() {
        let non_fetch = Arc::new(
            MockTool::new("web_search")
                .with_response(ToolResult::json(json!({"content": "not a page"}))),
        );
        let empty_fetch = Arc::new(
            MockTool::new("fetch_content")
                .fetching()
                .with_response(ToolResult::json(json!({"title": "Blank", "content": ""}))),
        );
        let error_fetch = Arc::new(
            MockTool::new("fetch_failing")
                .fetching()
                .with_response(ToolResult::json(json!({"content": "x", "error": "bad"}))),
        );
        let backend = Arc::new(MockBackend::new(vec![
            response(
                vec![
                    ContentBlock::tool_use("t1", "web_search", json!({"query": "q"})),
                    ContentBlock::tool_use("t2", "fetch_content", json!({"url": "https://a"})),
                    ContentBlock::tool_use("t3", "fetch_failing", json!({"url": "https://b"})),
                ],
                StopReason::ToolUse,
            ),
            text_response("<research_complete>ok</research_complete>"),
        ]));
        let agent = agent(&backend, vec![non_fetch, empty_fetch, error_fetch], 5);

        let result = agent.research("q").await.unwrap();
        assert!(result.sources.is_empty());
        assert!(result.raw_findings.is_empty());

        let results = last_tool_results(&backend.requests()[1]);
        let ids: Vec<&str> = results.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert!(results[2].2);
    }

    #[tokio::test]
    async fn test_findings_are_truncated() {
        let long = "é".repeat(MAX_FINDING_CHARS + 500);
        let backend = Arc::new(MockBackend::new(vec![
            fetch_response("toolu_1", "https://a"),
            text_response("<research_complete>ok</research_complete>"),
        ]));
        let agent = agent(&backend, vec![fetch_tool("", &long)], 5);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.raw_findings[0].chars().count(), MAX_FINDING_CHARS);
        assert_eq!(result.sources[0].title, "");
    }

    #[tokio::test]
    async fn test_usage_sums_every_call() {
        let backend = Arc::new(MockBackend::new(vec![
            CompletionResponse::new(
                "m1",
                "test-model",
                vec![ContentBlock::tool_use("t1", "fetch_content", json!({"url": "https://a"}))],
                StopReason::ToolUse,
                Usage::new(1000, 10),
            ),
            CompletionResponse::new(
                "m2",
                "test-model",
                vec![ContentBlock::text("<research_complete>ok</research_complete>")],
                StopReason::EndTurn,
                Usage::new(2000, 20),
            ),
        ]));
        let agent = agent(&backend, vec![fetch_tool("A", "x")], 5);

        let result = agent.research("q").await.unwrap();
        assert_eq!(result.usage.input_tokens, 3000);
        assert_eq!(result.usage.output_tokens, 30);
        assert_eq!(result.total_tokens(), 3030);
        assert_eq!(result.usage.model, agent.config().model);
        assert!(result.cost() > 0.0);
    }

    #[tokio::test]
    async fn test_never_exceeds_ceiling_plus_one_calls() {
        let responses = (0..10)
            .map(|i| fetch_response(&format!("toolu_{i}"), "https://a"))
            .collect();
        let backend = Arc::new(MockBackend::new(responses));
        let agent = agent(&backend, vec![fetch_tool("A", "x")], 4);

        let result = agent.research("q").await.unwrap();
        assert_eq!(backend.request_count(), 5);
        assert_eq!(result.iterations, 4);
        assert!(!result.completed);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let backend = Arc::new(MockBackend::with_text("never used"));
        let agent = agent(&backend, vec![], 5);
        let token = CancellationToken::new();
        token.cancel();

        let err = agent
            .research_with_cancellation("q", token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(backend.request_count(), 0);
    }

    /// Backend whose calls never finish in time.
    struct StalledBackend;

    #[async_trait]
    impl LlmBackend for StalledBackend {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> sleuth_llm::Result<CompletionResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(sleuth_llm::LlmError::Internal("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_research_with_timeout() {
        let agent = ResearchAgent::builder()
            .with_backend(StalledBackend)
            .build()
            .unwrap();

        let err = agent
            .research_with_timeout("q", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_independent() {
        let backend_a = Arc::new(MockBackend::new(vec![text_response(
            "<research_complete>A</research_complete>",
        )]));
        let backend_b = Arc::new(MockBackend::new(vec![
            fetch_response("t1", "https://b"),
            text_response("<research_complete>B</research_complete>"),
        ]));
        let agent_a = agent(&backend_a, vec![], 3);
        let agent_b = agent(&backend_b, vec![fetch_tool("B", "b")], 3);

        let (a, b) = tokio::join!(agent_a.research("a"), agent_b.research("b"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.summary, "A");
        assert!(a.sources.is_empty());
        assert_eq!(b.summary, "B");
        assert_eq!(b.sources.len(), 1);
    }
}
