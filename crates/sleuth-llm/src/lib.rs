//! LLM client abstraction for Sleuth.
//!
//! The research loop only ever talks to the [`LlmBackend`] trait. The crate
//! ships one real provider and, behind the `testing` feature, a scripted mock.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete() -> CompletionResponse     │
//! └─────────────────────────────────────────┘
//!          │                      │
//!          ▼                      ▼
//!   ┌─────────────┐        ┌─────────────┐
//!   │  Anthropic  │        │ MockBackend │
//!   └─────────────┘        └─────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod types;

// Provider implementations
pub mod anthropic;

pub use backend::{LlmBackend, SharedBackend, with_retry};
#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockResponse};
pub use error::{LlmError, RateLimitInfo, ResponseValidationError, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, Usage,
};

// Re-export provider configs
pub use anthropic::{AnthropicBackend, AnthropicConfig};
