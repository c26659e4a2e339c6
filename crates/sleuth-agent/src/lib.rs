//! Research loop for Sleuth.
//!
//! This crate provides the agent loop, tool framework, and built-in web
//! tools that turn a query into a researched summary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ResearchAgent                                              │
//! │  - Drives the bounded LLM/tool loop                         │
//! │  - Detects completion, forces a summary at the ceiling      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌──────────┐    ┌──────────────┐
//!       │LlmBackend│    │ToolReg   │    │ Conversation │
//!       │(sleuth-llm)│  │          │    │ UsageLedger  │
//!       └──────────┘    └──────────┘    └──────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`ResearchAgent`]: runs sessions and returns a [`ResearchResult`]
//! - [`Tool`] / [`ToolRegistry`]: capabilities offered to the model
//! - [`UsageLedger`]: token totals and cost
//! - [`ResearchConfig`]: per-session configuration

pub mod conversation;
pub mod error;
pub mod marker;
pub mod prompt;
pub mod research;
pub mod tool;
pub mod tools;
pub mod types;
pub mod usage;

// Re-export core types
pub use error::{AgentError, Result};
pub use types::{DEFAULT_MODEL, ResearchConfig, ResearchResult, SessionId, SourceRecord};

// Re-export the loop
pub use research::{MAX_FINDING_CHARS, ResearchAgent, ResearchAgentBuilder};

// Re-export tool types
pub use tool::{
    FetchContentParams, ParamExt, ParamResult, ParameterValidationError, Tool, ToolContext,
    ToolRegistry, ToolResult, WebSearchParams,
};

// Re-export accounting and markers
pub use marker::{CLOSE_TAG, OPEN_TAG, extract_completion};
pub use usage::{ModelPricing, UsageLedger};

// Re-export built-in tools
pub use tools::{
    FetchContentTool, SearchProvider, SearchResult, WebFetchConfig, WebSearchConfig,
    WebSearchTool, default_registry,
};

// Re-export the cancellation token callers hand to the loop
pub use tokio_util::sync::CancellationToken;
