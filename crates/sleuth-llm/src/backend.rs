//! LLM Backend trait and implementations.
//!
//! This module defines the abstraction the research loop talks to and, behind
//! the `testing` feature, a scripted mock for deterministic tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits).
/// Non-retryable errors are returned immediately. A rate limit that names its
/// own retry delay waits that long instead of the current backoff. Every wait
/// is capped at 30 seconds.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= max_retries {
            return Err(err);
        }
        attempt += 1;

        let wait = err.retry_after().unwrap_or(backoff).min(MAX_BACKOFF);
        tracing::warn!(
            backend = backend_name,
            attempt,
            max_retries,
            backoff_ms = wait.as_millis() as u64,
            error = %err,
            "Request failed, retrying"
        );
        tokio::time::sleep(wait).await;
        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A provider the research loop can send completion requests to.
///
/// Implementations must support native tool calling: tools travel in
/// `request.tools` and the response carries structured tool_use blocks.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted reply from the [`MockBackend`].
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this response.
    Success(CompletionResponse),
    /// Fail the call with a backend error carrying this message.
    Error(String),
}

/// A mock backend for testing purposes.
///
/// Returns pre-configured responses in order and records every request, so
/// tests can assert on exactly what the loop sent.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: parking_lot::Mutex<std::collections::VecDeque<MockResponse>>,
    request_log: parking_lot::Mutex<Vec<CompletionRequest>>,
}

#[cfg(any(test, feature = "testing"))]
impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(MockResponse::Success).collect())
    }

    /// Create a mock backend that can also fail on chosen calls.
    pub fn with_results(results: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: parking_lot::Mutex::new(results.into()),
            request_log: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        use crate::types::{ContentBlock, StopReason, Usage};

        Self::new(vec![CompletionResponse::new(
            "mock_msg_1",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        )])
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().push(request);

        match self.responses.lock().pop_front() {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(message)) => Err(LlmError::Backend(message)),
            None => Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
