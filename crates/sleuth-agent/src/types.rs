//! Core types for the agent crate.
//!
//! - [`SessionId`]: identifies one research session in logs
//! - [`ResearchConfig`]: per-session loop configuration
//! - [`SourceRecord`] and [`ResearchResult`]: what a session produces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompt::{SUMMARIZE_PROMPT, SYSTEM_PROMPT};
use crate::usage::UsageLedger;

// ─────────────────────────────────────────────────────────────────────────────
// ID Types
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Research Config
// ─────────────────────────────────────────────────────────────────────────────

/// Default model for research sessions.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Configuration for a research session.
///
/// Bounds are validated by the caller before the loop starts; the loop
/// trusts them as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Model identifier to use.
    pub model: String,
    /// Maximum tokens for each LLM response.
    pub max_tokens: u32,
    /// Iteration ceiling; at least 1.
    pub max_iterations: u32,
    /// System prompt sent with every call.
    pub system_prompt: String,
    /// Instruction appended when the iteration ceiling is reached.
    pub summarize_prompt: String,
}

impl ResearchConfig {
    /// Create a new config with the specified model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            max_iterations: 5,
            system_prompt: SYSTEM_PROMPT.to_string(),
            summarize_prompt: SUMMARIZE_PROMPT.to_string(),
        }
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the iteration ceiling.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the forced-summary instruction.
    pub fn with_summarize_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summarize_prompt = prompt.into();
        self
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Research Result
// ─────────────────────────────────────────────────────────────────────────────

/// A page the research drew on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// URL the fetch was requested for.
    pub url: String,
    /// Page title; empty when the tool reported none.
    pub title: String,
}

impl SourceRecord {
    /// Create a source record.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Outcome of a research session.
///
/// `sources[i]` and `raw_findings[i]` describe the same fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// The query as given.
    pub query: String,
    /// Final answer text.
    pub summary: String,
    /// Pages fetched, in fetch order.
    pub sources: Vec<SourceRecord>,
    /// Leading excerpt of each fetched page.
    pub raw_findings: Vec<String>,
    /// Loop iterations used.
    pub iterations: u32,
    /// Token totals across every LLM call.
    pub usage: UsageLedger,
    /// False when the iteration ceiling forced the summary.
    pub completed: bool,
    /// When the session finished.
    pub finished_at: DateTime<Utc>,
}

impl ResearchResult {
    /// Estimated cost in USD.
    pub fn cost(&self) -> f64 {
        self.usage.cost()
    }

    /// Total tokens across every call.
    pub fn total_tokens(&self) -> u64 {
        self.usage.total()
    }
}
